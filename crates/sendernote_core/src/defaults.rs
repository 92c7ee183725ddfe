//! Canned note texts offered before the user saves any template.

pub const DEFAULT_TEMPLATES: &[&str] = &[
    "Important client - always respond within 24 hours! 🔥",
    "VIP customer - handle with care ⭐",
    "Potential spam - verify before responding ⚠️",
    "Slow payer - request upfront payment 💰",
    "Old colleague / friend 👋",
    "Newsletter - low priority 📰",
];

/// Provider suitable for `NotesRepository::with_default_templates`.
pub fn default_templates() -> Vec<String> {
    DEFAULT_TEMPLATES.iter().map(|text| text.to_string()).collect()
}
