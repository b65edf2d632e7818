//! Daily plan rendering.
//!
//! The output uses WhatsApp's lightweight markup (`*bold*`) and must reach the
//! user byte-for-byte.

/// Prefix put in front of the plan when a learner starts a session.
pub const GREETING_PREFIX: &str = "👋 Welcome back, Absolute Learner!\n\n";

/// Render the three-slot daily plan for `topic`.
pub fn generate_plan(topic: &str) -> String {
    format!(
        "\n📘 *Today's Mission:* {topic}\n\
         \n\
         🕒 *Morning* – Watch 2 beginner-level videos on {topic} (YT or FreeCodeCamp)\n\
         💻 *Afternoon* – Build a hands-on project or complete an interactive tutorial\n\
         🧠 *Evening* – Quiz yourself, write 5 takeaways, and reflect\n\
         \n\
         Reply with \"done\" after each step to log progress or ask questions anytime!\n"
    )
}

/// Full start reply: greeting followed by the plan for `topic`.
pub fn greeting_reply(topic: &str) -> String {
    format!("{GREETING_PREFIX}{}", generate_plan(topic))
}
