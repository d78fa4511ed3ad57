//! Local replies used when the backend cannot answer.
//!
//! Replies are keyed on keyword groups in English and Japanese; the first
//! matching group wins. Callers mark the resulting message `isDemo`.

use crate::types::{Action, Message, MessageMetadata};
use rand::Rng;
use rand::seq::SliceRandom;

/// A synthesized reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackReply {
    /// Reply text.
    pub content: &'static str,
    /// Suggested follow-ups.
    pub actions: Vec<Action>,
}

impl FallbackReply {
    /// Converts the reply into an assistant message flagged as demo content.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::ai(self.content).with_metadata(MessageMetadata {
            sources: Some(self.actions),
            is_demo: Some(true),
            ..MessageMetadata::default()
        })
    }
}

struct Topic {
    keywords: &'static [&'static str],
    reply: &'static str,
    follow_up: (&'static str, &'static str),
}

const TOPICS: &[Topic] = &[
    Topic {
        keywords: &["reservation number", "reservation", "予約番号", "mnp番号"],
        reply: "An MNP reservation number is issued by your current carrier. You can request it on their website, by phone, or in a store. It is valid for 15 days, and most carriers need at least 10 days left on it when you apply.",
        follow_up: ("Where do I apply?", "Where do I apply with my new carrier?"),
    },
    Topic {
        keywords: &["fee", "cost", "price", "charge", "手数料", "料金", "費用"],
        reply: "Most major carriers no longer charge a porting-out fee. Your new carrier may still charge a contract fee, and any remaining device installments stay with your old carrier.",
        follow_up: ("How long does it take?", "How long does number porting take?"),
    },
    Topic {
        keywords: &["how long", "duration", "time", "days", "期間", "日数", "かかる"],
        reply: "Online applications usually complete within one or two days. In a store, porting is typically finished the same day once your identity is confirmed.",
        follow_up: ("What do I need?", "What documents do I need to port my number?"),
    },
    Topic {
        keywords: &["cancel", "carrier", "contract", "解約", "キャリア", "契約"],
        reply: "You do not need to cancel your old contract yourself. It ends automatically when the port completes with your new carrier.",
        follow_up: ("Reservation number", "How do I get an MNP reservation number?"),
    },
    Topic {
        keywords: &["esim", "e-sim"],
        reply: "Yes, you can port your number to an eSIM. After the port, you download the eSIM profile on your phone over Wi-Fi; keep your old SIM until the new line is active.",
        follow_up: ("Supported phones", "Which phones support eSIM?"),
    },
];

const GENERIC_REPLIES: &[&str] = &[
    "I'm having trouble reaching our support system right now. Meanwhile: porting a number starts with getting an MNP reservation number from your current carrier.",
    "Our assistant is temporarily unavailable. You can still ask about reservation numbers, fees, timing, or eSIM, and I'll share what I know.",
    "Sorry, I can't look that up at the moment. Please try again shortly, or ask to talk to a person.",
];

/// Reply for `utterance` using the thread-local RNG for the generic case.
#[must_use]
pub fn generate(utterance: &str) -> FallbackReply {
    generate_with(utterance, &mut rand::thread_rng())
}

/// Reply for `utterance` with an explicit RNG.
pub fn generate_with<R: Rng + ?Sized>(utterance: &str, rng: &mut R) -> FallbackReply {
    let text = utterance.to_lowercase();
    let escalate = Action::escalation("Talk to a person", "Assistant unavailable");

    if let Some(topic) = TOPICS
        .iter()
        .find(|t| t.keywords.iter().any(|k| text.contains(k)))
    {
        let (label, value) = topic.follow_up;
        return FallbackReply {
            content: topic.reply,
            actions: vec![Action::button(label, value), escalate],
        };
    }

    let content = GENERIC_REPLIES
        .choose(rng)
        .copied()
        .unwrap_or(GENERIC_REPLIES[0]);
    FallbackReply {
        content,
        actions: vec![escalate],
    }
}
