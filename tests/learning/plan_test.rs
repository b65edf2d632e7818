//! Daily plan rendering.

use absolute_learner::learning::{generate_plan, greeting_reply, DEFAULT_TOPICS, FALLBACK_TOPIC};

#[test]
fn every_topic_appears_exactly_twice() {
    for topic in DEFAULT_TOPICS.iter().copied().chain([FALLBACK_TOPIC]) {
        let plan = generate_plan(topic);
        assert_eq!(plan.matches(topic).count(), 2, "topic {topic}");
    }
}

#[test]
fn plan_has_three_slots_in_order() {
    let plan = generate_plan("Linux Basics");
    let morning = plan.find("*Morning*").expect("morning slot");
    let afternoon = plan.find("*Afternoon*").expect("afternoon slot");
    let evening = plan.find("*Evening*").expect("evening slot");
    assert!(morning < afternoon && afternoon < evening);
    assert!(plan.contains("Reply with \"done\" after each step"));
}

#[test]
fn plan_is_deterministic() {
    assert_eq!(generate_plan("SQL in 24 hrs"), generate_plan("SQL in 24 hrs"));
}

#[test]
fn plan_keeps_surrounding_newlines() {
    let plan = generate_plan("Figma UI Design");
    assert!(plan.starts_with("\n📘 *Today's Mission:* Figma UI Design\n"));
    assert!(plan.ends_with("anytime!\n"));
}

#[test]
fn topic_text_is_inserted_verbatim() {
    let plan = generate_plan("C++ & *Rust*");
    assert!(plan.contains("*Today's Mission:* C++ & *Rust*\n"));
    assert!(plan.contains("videos on C++ & *Rust* (YT"));
}

#[test]
fn greeting_reply_is_prefix_plus_plan() {
    let reply = greeting_reply("Prompt Engineering");
    assert_eq!(
        reply,
        format!(
            "👋 Welcome back, Absolute Learner!\n\n{}",
            generate_plan("Prompt Engineering")
        )
    );
}
