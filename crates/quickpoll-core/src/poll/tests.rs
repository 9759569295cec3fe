use super::*;
use chrono::Duration;

fn two_options() -> Vec<String> {
    vec!["yes".to_string(), "no".to_string()]
}

fn draft(id: &str) -> Poll {
    Poll::new(
        PollId::new(id).expect("valid poll id"),
        "Lunch spot?",
        two_options(),
        "creator-1",
        VotingMode::SingleChoice,
        ResultsVisibility::Live,
    )
    .expect("valid poll")
}

#[test]
fn poll_id_accepts_url_safe_tokens() {
    for id in ["a", "poll-42", "Ab_c-9", "x".repeat(MAX_POLL_ID_LEN).as_str()] {
        assert!(PollId::new(id).is_ok(), "id {id:?} should be accepted");
    }
}

#[test]
fn poll_id_rejects_empty() {
    assert_eq!(PollId::new(""), Err(PollError::EmptyId));
}

#[test]
fn poll_id_rejects_overlong() {
    let id = "x".repeat(MAX_POLL_ID_LEN + 1);
    assert_eq!(
        PollId::new(id),
        Err(PollError::IdTooLong {
            len: MAX_POLL_ID_LEN + 1,
            max: MAX_POLL_ID_LEN,
        })
    );
}

#[test]
fn poll_id_rejects_non_token_characters() {
    for id in ["has space", "slash/", "dot.", "é", "a\n"] {
        assert!(
            matches!(PollId::new(id), Err(PollError::IdInvalidCharacter { .. })),
            "id {id:?} should be rejected"
        );
    }
}

#[test]
fn new_poll_starts_with_zero_votes_and_no_expiry() {
    let poll = draft("p1");
    assert_eq!(poll.total_votes, 0);
    assert_eq!(poll.expires_at, None);
    assert_eq!(poll.option_count(), 2);
}

#[test]
fn empty_title_rejected() {
    let result = Poll::new(
        PollId::new("p1").expect("valid poll id"),
        "   ",
        two_options(),
        "creator-1",
        VotingMode::SingleChoice,
        ResultsVisibility::Live,
    );
    assert_eq!(result.err(), Some(PollError::EmptyTitle));
}

#[test]
fn option_count_bounds_enforced() {
    let one = Poll::new(
        PollId::new("p1").expect("valid poll id"),
        "t",
        vec!["only".to_string()],
        "creator-1",
        VotingMode::SingleChoice,
        ResultsVisibility::Live,
    );
    assert!(matches!(one, Err(PollError::TooFewOptions { count: 1, .. })));

    let eleven = Poll::new(
        PollId::new("p2").expect("valid poll id"),
        "t",
        (0..=MAX_OPTIONS).map(|i| format!("opt-{i}")).collect(),
        "creator-1",
        VotingMode::SingleChoice,
        ResultsVisibility::Live,
    );
    assert!(matches!(
        eleven,
        Err(PollError::TooManyOptions { count: 11, .. })
    ));
}

#[test]
fn blank_option_label_rejected() {
    let result = Poll::new(
        PollId::new("p1").expect("valid poll id"),
        "t",
        vec!["yes".to_string(), " ".to_string()],
        "creator-1",
        VotingMode::SingleChoice,
        ResultsVisibility::Live,
    );
    assert_eq!(result.err(), Some(PollError::EmptyOption { index: 1 }));
}

#[test]
fn expiry_must_follow_creation() {
    let poll = draft("p1");
    let before = poll.created_at - Duration::seconds(1);
    assert!(matches!(
        poll.clone().with_expiry(before),
        Err(PollError::ExpiryBeforeCreation { .. })
    ));
    assert!(matches!(poll.clone().with_expiry(poll.created_at), Err(_)));

    let after = poll.created_at + Duration::hours(1);
    let poll = poll.with_expiry(after).expect("valid expiry");
    assert_eq!(poll.expires_at, Some(after));
}

#[test]
fn closure_boundary_is_inclusive() {
    let poll = draft("p1");
    let deadline = poll.created_at + Duration::hours(1);
    let poll = poll.with_expiry(deadline).expect("valid expiry");

    assert!(!poll.is_closed_at(deadline - Duration::seconds(1)));
    assert!(poll.is_closed_at(deadline), "exactly at expiry is closed");
    assert!(poll.is_closed_at(deadline + Duration::seconds(1)));
}

#[test]
fn poll_without_expiry_never_closes() {
    let poll = draft("p1");
    assert!(!poll.is_closed_at(poll.created_at + Duration::days(365 * 100)));
}

#[test]
fn mode_and_visibility_round_trip_through_strings() {
    for mode in [VotingMode::SingleChoice, VotingMode::MultiChoice] {
        assert_eq!(mode.as_str().parse::<VotingMode>(), Ok(mode));
    }
    for vis in [ResultsVisibility::AfterVote, ResultsVisibility::Live] {
        assert_eq!(vis.as_str().parse::<ResultsVisibility>(), Ok(vis));
    }
    assert!(matches!(
        "live-ish".parse::<ResultsVisibility>(),
        Err(PollError::UnknownVariant { field: "visibility", .. })
    ));
}
