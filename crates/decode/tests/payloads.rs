use lenta_core::{DecodeError, EntityKind, FieldType};
use lenta_decode::{decode, decode_page, decode_single, Intermediate, Payload};
use serde_json::json;

fn topic_row(id: u64) -> serde_json::Value {
    json!([id, "Подвеска", 3, 12, "Ремонт", 77, "mechanic", 41, 1_731_000_000u64])
}

#[test]
fn topic_page_decodes_every_slot() {
    let body = json!([0, 991, 240, [topic_row(5), topic_row(6)]]).to_string();
    let page = decode_page(EntityKind::Topic, body.as_bytes()).unwrap();
    assert_eq!(page.total, 240);
    assert_eq!(page.failures(), 0);
    match &page.items[0] {
        Ok(Intermediate::Topic(t)) => {
            assert_eq!(t.id, 5);
            assert_eq!(t.name, "Подвеска");
            assert_eq!(t.flags, 3);
            assert_eq!(t.forum_name, "Ремонт");
            assert_eq!(t.last_author_id, Some(77));
            assert_eq!(t.post_count, Some(41));
            assert_eq!(t.last_activity, 1_731_000_000);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn one_bad_item_does_not_fail_the_page() {
    let bad = json!([7, "no forum", 0, 12]);
    let body = json!([0, null, 3, [topic_row(1), bad, topic_row(2)]]).to_string();
    let page = decode_page(EntityKind::Topic, body.as_bytes()).unwrap();
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.failures(), 1);
    assert_eq!(
        page.items[1].clone().unwrap_err(),
        DecodeError::SchemaMismatch { kind: EntityKind::Topic, index: 4, field: "forum_name", expected: FieldType::Str }
    );
}

#[test]
fn history_entry_reads_visit_time_from_slot_eight() {
    let row = json!([5, "Подвеска", 0, 12, "Ремонт", null, null, null, 1_731_067_200u64]);
    match decode(EntityKind::History, Payload::Positional(&row)).unwrap() {
        Intermediate::History(h) => {
            assert_eq!(h.seen_at, 1_731_067_200);
            assert_eq!(h.topic.id, 5);
            assert_eq!(h.topic.last_author_id, None);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn comment_root_markers() {
    for parent in [json!(null), json!(0)] {
        let row = json!([10, 0, 3, "anna", 1_700_000_000u64, parent, "hi", 2]);
        match decode(EntityKind::Comment, Payload::Positional(&row)).unwrap() {
            Intermediate::Comment(c) => {
                assert_eq!(c.parent_id, None);
                assert_eq!(c.avatar_url, None);
                assert_eq!(c.edited_at, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn post_attachments_are_validated() {
    let good = json!([
        1, 0, 3, "anna", 1_700_000_000u64, "<p>hi</p>", 0, null, null, null,
        [[9, "photo.jpg", 2048, "https://cdn.example/photo.jpg"]]
    ]);
    match decode(EntityKind::Post, Payload::Positional(&good)).unwrap() {
        Intermediate::Post(p) => {
            assert_eq!(p.attachments.len(), 1);
            assert_eq!(p.attachments[0].name, "photo.jpg");
        }
        other => panic!("unexpected {other:?}"),
    }

    let bad = json!([1, 0, 3, "anna", 1_700_000_000u64, "<p>hi</p>", 0, null, null, null, [[9, "photo.jpg", "big"]]]);
    let err = decode(EntityKind::Post, Payload::Positional(&bad)).unwrap_err();
    assert!(matches!(err, DecodeError::SchemaMismatch { field: "attachment.size", .. }));
}

#[test]
fn user_with_negative_karma() {
    let row = json!([42, "ivan", null, 1_500_000_000u64, 1_700_000_000u64, "Нет", -125, 10, 20, -3, 1, 2]);
    match decode(EntityKind::User, Payload::Positional(&row)).unwrap() {
        Intermediate::User(u) => {
            assert_eq!(u.karma, -125);
            assert_eq!(u.reputation, -3);
            assert_eq!(u.city.as_deref(), Some("Нет"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn mistyped_timestamp_is_never_defaulted() {
    let row = json!(["https://x.ru/a", "t", "d", "a", "yesterday", "https://x.ru/c.jpg", 0, 0]);
    let err = decode(EntityKind::Article, Payload::Positional(&row)).unwrap_err();
    assert_eq!(err.index(), Some(4));
}

#[test]
fn single_record_envelope() {
    let body = json!([0, 5, [42, "ivan", null, 1, 2, null, 0, 0, 0, 0, 0, 0]]).to_string();
    assert!(matches!(decode_single(EntityKind::User, body.as_bytes()), Ok(Intermediate::User(_))));

    let body = json!([0, 5, null]).to_string();
    assert_eq!(decode_single(EntityKind::User, body.as_bytes()).unwrap_err().index(), Some(2));
}
