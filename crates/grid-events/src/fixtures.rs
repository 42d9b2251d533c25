//! Sample data fixtures for testing.
//!
//! Enable the `test-fixtures` feature to use these helpers from other crates.
//!
//! ```ignore
//! // [dev-dependencies]
//! // grid-events = { path = "../grid-events", features = ["test-fixtures"] }
//!
//! use grid_events::fixtures;
//!
//! let transcript = fixtures::sample_transcript();
//! ```

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    AgentActionRecord, AgentId, ConversationKey, ConversationTurn, Position, ProximityPair,
    TickReport, Transcript,
};

/// Fixed timestamp `seconds` after the fixture epoch.
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
}

/// Key for the William/Emma pair.
pub fn sample_key() -> ConversationKey {
    ConversationKey::new(AgentId::from("william"), AgentId::from("emma"))
        .expect("fixture agents are distinct")
}

/// A turn from `speaker` to `recipient` stamped `seconds` after the epoch.
pub fn turn(speaker: &str, recipient: &str, message: &str, seconds: i64) -> ConversationTurn {
    ConversationTurn::new(speaker.into(), recipient.into(), message, at(seconds))
}

/// Two-turn transcript between William and Emma.
pub fn sample_transcript() -> Transcript {
    let mut transcript = Transcript::empty(sample_key());
    transcript.extend(vec![
        turn(
            "emma",
            "william",
            "Hello Agent william, I noticed you're nearby. How are you doing?",
            0,
        ),
        turn("william", "emma", "Doing well, thanks for asking!", 1),
    ]);
    transcript
}

/// Report for a tick where William and Emma moved next to each other and talked.
pub fn sample_report() -> TickReport {
    let mut report = TickReport::new(Uuid::nil(), 7, at(10));
    report.proximity.push(ProximityPair::new(sample_key(), 1.0));
    report.record(
        "emma".into(),
        AgentActionRecord::Moved {
            from: Position::new(5, 5),
            to: Position::new(6, 5),
        },
    );
    report.record(
        "william".into(),
        AgentActionRecord::Moved {
            from: Position::new(6, 6),
            to: Position::new(7, 5),
        },
    );

    let reply = turn("william", "emma", "Doing well, thanks for asking!", 10);
    report.record(
        "emma".into(),
        AgentActionRecord::Conversed {
            with: "william".into(),
            turn: reply.clone(),
        },
    );
    report.record(
        "william".into(),
        AgentActionRecord::Conversed {
            with: "emma".into(),
            turn: reply,
        },
    );
    report
}
