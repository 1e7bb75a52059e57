//! Error types for the formula and condition languages

use cardprop_model::PropertyKind;

/// Formula parse and typing failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    /// Empty formula text
    #[error("formula can't be blank")]
    Empty,

    /// Syntax error
    #[error("formula is malformed: {message}")]
    Malformed { message: String },

    /// Name does not resolve to a property
    #[error("the property {name} does not exist")]
    UnknownProperty { name: String },

    /// Property kind has no numeric or date interpretation
    #[error("the property {name} is a {kind} property and can't be used in a formula")]
    NonNumericProperty { name: String, kind: PropertyKind },

    /// Operand types don't combine
    #[error("the expression {expression} is invalid because {reason}")]
    TypeMismatch { expression: String, reason: String },
}

/// Constructs aggregate conditions may not use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisallowedConstruct {
    /// `TODAY`
    Today,
    /// `CURRENT USER`
    CurrentUser,
    /// `THIS CARD` / `THIS CARD.property`
    ThisCard,
    /// `FROM TREE`
    FromTree,
    /// `SELECT` query wrapper
    Select,
    /// `WHERE` query wrapper
    Where,
    /// `ORDER BY` query wrapper
    OrderBy,
}

impl DisallowedConstruct {
    /// Keyword as written in queries
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Today => "TODAY",
            Self::CurrentUser => "CURRENT USER",
            Self::ThisCard => "THIS CARD",
            Self::FromTree => "FROM TREE",
            Self::Select => "SELECT",
            Self::Where => "WHERE",
            Self::OrderBy => "ORDER BY",
        }
    }

    /// Message shown to the user
    #[must_use]
    pub fn message(self) -> String {
        match self {
            Self::Today | Self::CurrentUser | Self::ThisCard => format!(
                "{} is not supported in aggregate conditions because its value changes outside the tree",
                self.keyword()
            ),
            Self::FromTree => {
                "FROM TREE is not supported in aggregate conditions; the aggregate's tree is already the scope".to_string()
            }
            Self::Select | Self::Where | Self::OrderBy => format!(
                "{} is not supported in aggregate conditions; enter only the condition, for example: status = open",
                self.keyword()
            ),
        }
    }
}

/// Aggregate condition parse failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    /// Empty condition text
    #[error("condition can't be blank")]
    Empty,

    /// Disallowed construct
    #[error("{}", .construct.message())]
    Disallowed { construct: DisallowedConstruct },

    /// Name does not resolve to a property
    #[error("the property {name} does not exist")]
    UnknownProperty { name: String },

    /// Syntax error
    #[error("condition is malformed: {message}")]
    Malformed { message: String },
}
