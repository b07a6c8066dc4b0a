//! Tests for the in-memory mailbox

use prometheus_ward::core::{AllocationNotice, Category, Mailbox};
use prometheus_ward::infra::InMemoryMailbox;

fn notice(request_id: u64, requester: &str, at: u128) -> AllocationNotice {
    AllocationNotice {
        request_id,
        requester: requester.into(),
        category: Category::Checkup,
        doctor: "D1".into(),
        room: "R1".into(),
        equipment: None,
        delivered_at_ms: at,
    }
}

#[test]
fn test_fetch_by_requester() {
    let mut mailbox = InMemoryMailbox::new();
    mailbox.deliver(notice(1, "P1", 100)).unwrap();
    mailbox.deliver(notice(2, "P2", 110)).unwrap();
    mailbox.deliver(notice(3, "P1", 120)).unwrap();

    let p1 = mailbox.fetch("P1", None, 10);
    assert_eq!(p1.iter().map(|n| n.request_id).collect::<Vec<_>>(), vec![1, 3]);
    assert!(mailbox.fetch("P3", None, 10).is_empty());
    assert_eq!(mailbox.len(), 3);
}

#[test]
fn test_fetch_since_and_limit() {
    let mut mailbox = InMemoryMailbox::new();
    for (i, at) in [100u128, 200, 300, 400].into_iter().enumerate() {
        mailbox.deliver(notice(i as u64, "P1", at)).unwrap();
    }
    let since = mailbox.fetch("P1", Some(200), 10);
    assert_eq!(since.len(), 3);
    assert_eq!(since[0].delivered_at_ms, 200);

    let limited = mailbox.fetch("P1", Some(200), 2);
    assert_eq!(limited.len(), 2);
}
