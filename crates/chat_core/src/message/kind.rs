use serde::{Deserialize, Serialize};

/// What a transcript entry is, carried on the message instead of being
/// sniffed out of string prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    User,
    Assistant,
    FileContext,
    UrlContext,
    SearchContext,
}

/// Role as the upstream chat endpoint understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    Assistant,
}

impl ContextKind {
    /// Injected context travels upstream as a user turn.
    pub fn wire_role(self) -> WireRole {
        match self {
            ContextKind::Assistant => WireRole::Assistant,
            _ => WireRole::User,
        }
    }

    pub fn is_injection(self) -> bool {
        self.tag().is_some()
    }

    /// First line of an injected context block.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            ContextKind::FileContext => Some("[File Context]"),
            ContextKind::UrlContext => Some("[URL Context]"),
            ContextKind::SearchContext => Some("[Search Context]"),
            ContextKind::User | ContextKind::Assistant => None,
        }
    }

    /// Label of the source line following the tag.
    pub(crate) fn source_label(self) -> &'static str {
        match self {
            ContextKind::FileContext => "File",
            ContextKind::UrlContext => "URL",
            ContextKind::SearchContext => "Query",
            ContextKind::User | ContextKind::Assistant => "",
        }
    }
}
