//! Default relationship names

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].trim_end(),
        None => text,
    }
}

/// Default relationship name `{tree} - {type}`, cut to `max` characters.
///
/// When `taken` rejects the default, ` 1`, ` 2` ... is appended, cutting
/// the base further so the result still fits.
pub fn suggest_name(tree: &str, card_type: &str, max: usize, taken: impl Fn(&str) -> bool) -> String {
    let full = format!("{tree} - {card_type}");
    let base = truncate(&full, max);
    if !taken(base) {
        return base.to_string();
    }
    let mut n: u32 = 1;
    loop {
        let suffix = format!(" {n}");
        let room = max.saturating_sub(suffix.len());
        let candidate = format!("{}{suffix}", truncate(base, room));
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_is_tree_dash_type() {
        assert_eq!(suggest_name("Planning", "Release", 40, |_| false), "Planning - Release");
    }

    #[test]
    fn long_defaults_are_cut() {
        let tree = "A very long planning tree name";
        let name = suggest_name(tree, "Iteration", 40, |_| false);
        assert_eq!(name.chars().count(), 40);
        assert!(name.starts_with("A very long planning tree name - Iter"));
    }

    #[test]
    fn repeats_get_numeric_suffix() {
        let used = ["Planning - Story", "Planning - Story 1"];
        let name = suggest_name("Planning", "Story", 40, |c| used.contains(&c));
        assert_eq!(name, "Planning - Story 2");
    }

    #[test]
    fn suffix_fits_after_cut() {
        let tree = "x".repeat(50);
        let first = suggest_name(&tree, "Story", 40, |_| false);
        let second = suggest_name(&tree, "Story", 40, |c| c == first);
        assert_eq!(second.chars().count(), 40);
        assert!(second.ends_with(" 1"));
    }

    proptest! {
        #[test]
        fn prop_suggestions_fit_and_avoid_taken(
            tree in "[A-Za-z ]{1,60}",
            card_type in "[A-Za-z]{1,20}",
            taken_count in 0..5usize,
        ) {
            let mut taken = Vec::new();
            for _ in 0..taken_count {
                let next = suggest_name(&tree, &card_type, 40, |c| taken.iter().any(|t: &String| t == c));
                taken.push(next);
            }
            let name = suggest_name(&tree, &card_type, 40, |c| taken.iter().any(|t| t == c));
            prop_assert!(name.chars().count() <= 40);
            prop_assert!(!taken.contains(&name));
        }
    }
}
