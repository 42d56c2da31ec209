//! Final prompt composition
//!
//! Pure string building: style text plus optional user text, wrapped in
//! the instruction blocks that keep the hand-drawn sketch recognizable
//! in the generated artwork.

/// Keeps the sketch as the foundation and main subject of the result.
const SKETCH_PRESERVATION_INSTRUCTIONS: &str = "Transform this hand-drawn sketch into a complete artwork. \
     Preserve the original sketch structure, outlines, shapes, and composition. \
     Use the sketch lines as the foundation and main subject of the image. \
     Maintain the proportions and positioning from the original drawing. \
     Keep the core elements and silhouette of the sketch recognizable";

/// Artistic enhancement on top of the preserved forms.
const ENHANCEMENT_INSTRUCTIONS: &str = "Enhance and refine the sketch with professional quality details. \
     Add appropriate lighting, shadows, and depth while respecting the original forms. \
     Seamlessly blend the artistic style with the user creation. \
     Fill in details naturally based on the sketch context";

const QUALITY_INSTRUCTIONS: &str = "High quality, detailed, professional artwork";

/// User prompts longer than this are truncated.
const MAX_USER_PROMPT_CHARS: usize = 500;

/// Compose the final prompt sent to a generation backend.
pub fn build_final_prompt(style_prompt: &str, user_prompt: Option<&str>) -> String {
    let sanitized_user: Option<String> = user_prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.chars().take(MAX_USER_PROMPT_CHARS).collect());

    let content_and_style = match sanitized_user {
        Some(user) => format!("User description: {}. Apply style: {}", user, style_prompt),
        None => format!("Apply style: {}", style_prompt),
    };

    [
        SKETCH_PRESERVATION_INSTRUCTIONS,
        ENHANCEMENT_INSTRUCTIONS,
        &content_and_style,
        QUALITY_INSTRUCTIONS,
    ]
    .join(". ")
}
