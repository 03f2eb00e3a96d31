use lenta_assemble::{assemble_page, Articles, Posts, Users, Visits};
use lenta_core::{DecodeError, EntityError, EntityKind};
use serde_json::json;

fn article(url: &str, published_at: u64) -> serde_json::Value {
    json!([url, "Новая модель", "Обзор", "Редакция", published_at, "https://img.example/cover.jpg", 1, 12])
}

#[test]
fn news_page_keeps_good_articles() {
    let body = json!([
        0,
        1,
        120,
        [
            article("https://www.example.ru/news/1", 1_731_000_000),
            article("news/2", 1_731_000_100),
            ["https://www.example.ru/news/3", "no more fields"],
            article("https://www.example.ru/news/4", 1_731_000_200),
        ]
    ])
    .to_string();
    let batch = assemble_page::<Articles>(body.as_bytes()).unwrap();
    assert_eq!(batch.total, 120);
    assert!(batch.is_partial());
    let urls: Vec<_> = batch.succeeded.iter().map(|a| a.url.as_str().to_string()).collect();
    assert_eq!(urls, vec!["https://www.example.ru/news/1", "https://www.example.ru/news/4"]);
    assert_eq!(batch.failed.len(), 2);
    assert_eq!(batch.failed[0].position, 1);
    assert!(matches!(batch.failed[0].error, EntityError::Assembly(_)));
    assert!(matches!(
        batch.failed[1].error,
        EntityError::Decode(DecodeError::SchemaMismatch { kind: EntityKind::Article, index: 2, .. })
    ));
}

#[test]
fn envelope_failure_fails_the_call() {
    let body = json!(["ok", 1, 0, []]).to_string();
    let err = assemble_page::<Articles>(body.as_bytes()).unwrap_err();
    assert_eq!(err.index(), Some(0));
}

#[test]
fn forum_posts_have_plain_bodies() {
    let body = json!([
        0,
        null,
        2,
        [
            [1, 0, 10, "anna", 1_700_000_000u64, "<p>Первый &mdash; пост</p>", 4, null, null, null, null],
            [2, 1, 11, "oleg", 1_700_000_500u64, "<div>ответ<br>вторая строка</div>", 0, null, 1_700_000_600u64, 1, []]
        ]
    ])
    .to_string();
    let batch = assemble_page::<Posts>(body.as_bytes()).unwrap();
    assert!(!batch.is_partial());
    assert_eq!(batch.succeeded[0].body, "Первый — пост");
    assert_eq!(batch.succeeded[1].body, "ответ\nвторая строка");
    assert!(batch.succeeded[1].is_deleted);
    assert!(batch.succeeded[1].is_edited());
}

#[test]
fn history_entries_carry_visit_time() {
    let body = json!([0, null, 1, [[5, "Подвеска", 1, 12, "Ремонт", null, null, null, 1_731_067_200u64]]]).to_string();
    let batch = assemble_page::<Visits>(body.as_bytes()).unwrap();
    let entry = &batch.succeeded[0];
    assert_eq!(entry.seen_at.timestamp(), 1_731_067_200);
    assert!(entry.topic.is_unread);
    assert_eq!(entry.topic.forum.name, "Ремонт");
}

#[test]
fn user_page() {
    let body = json!([0, null, 1, [[42, "ivan", "https://cdn.example/u/42.png", 1_500_000_000u64, 1_700_000_000u64, "Москва", 250, 1, 2, 3, 4, 5]]])
        .to_string();
    let batch = assemble_page::<Users>(body.as_bytes()).unwrap();
    let u = &batch.succeeded[0];
    assert_eq!(u.city.as_deref(), Some("Москва"));
    assert_eq!(u.stats.karma.to_string(), "2.50");
    assert!(!u.avatar.is_placeholder());
}
