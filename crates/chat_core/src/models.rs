//! Model alias table.

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const MODELS: &[(&str, &str)] = &[
    ("gpt-4o-mini", "gpt-4o-mini"),
    ("claude-3-haiku", "claude-3-haiku-20240307"),
    ("llama", "meta-llama/Llama-3.3-70B-Instruct-Turbo"),
    ("mixtral", "mistralai/Mistral-Small-24B-Instruct-2501"),
    ("o4mini", "o4-mini"),
    ("o3mini", "o3-mini"),
];

/// Resolve a short alias to the upstream model id. Unknown names pass through.
pub fn resolve_model(name: &str) -> String {
    let name = name.trim();
    MODELS
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map(|(_, id)| (*id).to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Short alias for an upstream id, `"unknown"` when it is not in the table.
pub fn display_name(model_id: &str) -> &'static str {
    MODELS
        .iter()
        .find(|(_, id)| *id == model_id)
        .map(|(alias, _)| *alias)
        .unwrap_or("unknown")
}

pub fn aliases() -> impl Iterator<Item = &'static str> {
    MODELS.iter().map(|(alias, _)| *alias)
}
