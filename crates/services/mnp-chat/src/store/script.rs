//! Canned assistant lines used by the store.

use crate::types::{Action, ChatMode, Message, MessageMetadata};

/// Greeting appended by `start_new_session`.
pub(crate) fn greeting(mode: ChatMode) -> Message {
    let body = match mode {
        ChatMode::StepByStep => {
            "Hello! I can walk you through moving your phone number to a new carrier, one step at a time. What would you like to know first?"
        }
        ChatMode::Roadmap => {
            "Hello! Here is the whole porting procedure at a glance: 1) get an MNP reservation number from your current carrier, 2) apply with your new carrier, 3) activate your new SIM or eSIM. Ask me about any step."
        }
    };
    Message::ai(body)
}

/// Topics offered right after the greeting.
pub fn default_quick_replies() -> Vec<Action> {
    vec![
        Action::button(
            "Reservation number",
            "How do I get an MNP reservation number?",
        ),
        Action::button("Fees", "What fees are involved in porting my number?"),
        Action::button("How long?", "How long does number porting take?"),
        Action::button("eSIM", "Can I port my number to an eSIM?"),
        Action::escalation("Talk to a person", "Customer asked for a human agent"),
    ]
}

/// Quick-reply message appended after the greeting delay.
pub(crate) fn quick_reply_prompt() -> Message {
    Message::ai("Pick a topic below, or type your own question.").with_metadata(MessageMetadata {
        sources: Some(default_quick_replies()),
        ..MessageMetadata::default()
    })
}

pub(crate) fn mode_switched(mode: ChatMode) -> Message {
    Message::system(format!("Switched to {} mode.", mode.label()))
}

pub(crate) fn send_failed(error: &str) -> Message {
    Message::system(format!("Your message could not be sent: {error}"))
}

pub(crate) fn escalated(ticket_id: &str, wait_minutes: Option<u32>) -> Message {
    let wait = wait_minutes.map_or_else(String::new, |m| {
        format!(" Estimated wait: about {m} minute{}.", if m == 1 { "" } else { "s" })
    });
    Message::system(format!(
        "You have been connected to our support queue. Ticket ID: {ticket_id}.{wait}"
    ))
}
