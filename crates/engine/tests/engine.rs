use std::sync::Arc;
use std::time::Duration;

use lenta_cache::CacheKey;
use lenta_core::{Block, CommentId, DecodeError, ForumId, TopicId, UserId};
use lenta_engine::{Engine, EngineConfig, EngineError, MockTransport, Request};
use serde_json::json;
use tokio::time::advance;
use url::Url;

fn article_url() -> Url {
    "https://www.example.ru/news/1".parse().unwrap()
}

fn engine(transport: &Arc<MockTransport>) -> Engine<MockTransport> {
    Engine::new(Arc::clone(transport), EngineConfig::default())
}

fn news_body() -> String {
    json!([
        0,
        1,
        40,
        [["https://www.example.ru/news/1", "Новая модель", "Обзор", "Редакция", 1_731_000_000u64, "https://img.example/c.jpg", 1, 12]]
    ])
    .to_string()
}

fn comments_body(ids: &[(u64, Option<u64>)]) -> String {
    let rows: Vec<_> =
        ids.iter().map(|(id, parent)| json!([id, 0, 3, "anna", 1_700_000_000u64 + id, parent, format!("c{id}"), 0])).collect();
    json!([0, null, rows.len(), rows]).to_string()
}

#[tokio::test(start_paused = true)]
async fn news_is_served_from_cache() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Request::News { page: 1 }, news_body());
    let engine = engine(&transport);

    let first = engine.news(1).await.unwrap();
    let second = engine.news(1).await.unwrap();
    assert_eq!(first.total, 40);
    assert_eq!(second.succeeded[0].title, "Новая модель");
    assert_eq!(transport.calls(&Request::News { page: 1 }), 1);

    advance(engine.config().ttl.news + Duration::from_secs(1)).await;
    engine.news(1).await.unwrap();
    assert_eq!(transport.calls(&Request::News { page: 1 }), 2);
}

#[tokio::test(start_paused = true)]
async fn comment_posted_forces_refetch() {
    let transport = Arc::new(MockTransport::new());
    let url = article_url();
    let request = Request::Comments { url: url.clone() };
    transport.respond(request.clone(), comments_body(&[(1, None), (2, Some(1))]));
    let engine = engine(&transport);

    let thread = engine.comments(&url).await.unwrap();
    assert_eq!(thread.tree.len(), 2);
    assert_eq!(thread.tree.find(CommentId(2)).unwrap().nest_level, 1);
    engine.comments(&url).await.unwrap();
    assert_eq!(transport.calls(&request), 1);

    transport.respond(request.clone(), comments_body(&[(1, None), (2, Some(1)), (3, Some(2))]));
    engine.comment_posted(&url);
    let thread = engine.comments(&url).await.unwrap();
    assert_eq!(transport.calls(&request), 2);
    assert_eq!(thread.tree.find(CommentId(3)).unwrap().nest_level, 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_reads_share_one_request() {
    let transport = Arc::new(MockTransport::with_latency(Duration::from_millis(30)));
    let url = article_url();
    let request = Request::Comments { url: url.clone() };
    transport.respond(request.clone(), comments_body(&[(1, None)]));
    let engine = engine(&transport);

    let (a, b, c) = tokio::join!(engine.comments(&url), engine.comments(&url), engine.comments(&url));
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert!(c.is_ok());
    assert_eq!(transport.calls(&request), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failures_are_wrapped_and_not_cached() {
    let transport = Arc::new(MockTransport::new());
    transport.fail(Request::User { id: UserId(42) }, "connection reset");
    let engine = engine(&transport);

    let err = engine.user(UserId(42)).await.unwrap_err();
    match &err {
        EngineError::CacheFetchFailed { key, .. } => assert_eq!(key, "user/42"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(err.root(), EngineError::Transport(_)));
    assert!(err.to_string().contains("connection reset"));

    transport.respond(
        Request::User { id: UserId(42) },
        json!([0, 5, [42, "ivan", null, 1_500_000_000u64, 1_700_000_000u64, "Нет", -125, 10, 20, -3, 1, 2]]).to_string(),
    );
    let user = engine.user(UserId(42)).await.unwrap();
    assert_eq!(user.nickname, "ivan");
    assert_eq!(user.city, None);
    assert!(user.avatar.is_placeholder());
    assert_eq!(transport.calls(&Request::User { id: UserId(42) }), 2);
}

#[tokio::test(start_paused = true)]
async fn upstream_status_surfaces_as_decode_error() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Request::News { page: 3 }, json!([7, null, 0, []]).to_string());
    let engine = engine(&transport);
    let err = engine.news(3).await.unwrap_err();
    assert!(matches!(err.root(), EngineError::Decode(DecodeError::UpstreamStatus { code: 7 })));
}

#[tokio::test(start_paused = true)]
async fn article_body_is_decoded_html() {
    let transport = Arc::new(MockTransport::new());
    let url = article_url();
    transport.respond(Request::ArticleBody { url: url.clone() }, "<h2>Итоги</h2><p>Текст &laquo;статьи&raquo;</p><blink>x</blink>");
    let engine = engine(&transport);

    let doc = engine.article_body(&url).await.unwrap();
    assert!(matches!(doc.blocks[0], Block::Heading { .. }));
    assert!(doc.plain_text().contains("Текст «статьи»"));
    assert!(doc.is_degraded());

    transport.respond(Request::ArticleBody { url: url.clone() }, vec![b'<', b'p', 0, b'>']);
    assert!(engine.invalidate(&CacheKey::Article(url.clone())));
    let err = engine.article_body(&url).await.unwrap_err();
    assert!(matches!(err.root(), EngineError::Decode(DecodeError::MalformedDocument(_))));
}

#[tokio::test(start_paused = true)]
async fn history_is_bucketed_by_day() {
    let transport = Arc::new(MockTransport::new());
    let seen = 1_731_067_200u64;
    let row = |id: u64, at: u64| json!([id, format!("t{id}"), 0, 12, "Ремонт", null, null, null, at]);
    let body = json!([0, null, 4, [row(1, seen), row(2, seen), ["broken"], row(3, seen - 2 * 86_400)]]).to_string();
    let per_page = EngineConfig::default().history_per_page;
    transport.respond(Request::History { page: 1, per_page }, body);
    let engine = engine(&transport);

    let page = engine.history(1).await.unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.failed.len(), 1);
    assert_eq!(page.failed[0].position, 2);
    assert_eq!(page.buckets.len(), 2);
    assert!(page.buckets[0].day > page.buckets[1].day);
    let names: Vec<_> = page.buckets[0].topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["t1", "t2"]);
    assert_eq!(page.buckets[1].topics[0].id, TopicId(3));
}

#[tokio::test(start_paused = true)]
async fn topic_replied_drops_every_page_of_the_topic() {
    let transport = Arc::new(MockTransport::new());
    let post = |id: u64| json!([id, 0, 10, "anna", 1_700_000_000u64, "<p>пост</p>", 0, null, null, null, null]);
    for page in 1..=2 {
        transport.respond(Request::Topic { id: TopicId(5), page }, json!([0, null, 2, [post(page as u64)]]).to_string());
    }
    transport.respond(Request::Topic { id: TopicId(6), page: 1 }, json!([0, null, 1, [post(9)]]).to_string());
    let engine = engine(&transport);

    engine.topic_posts(TopicId(5), 1).await.unwrap();
    engine.topic_posts(TopicId(5), 2).await.unwrap();
    let other = engine.topic_posts(TopicId(6), 1).await.unwrap();
    assert_eq!(other.tree.find(CommentId(9)).unwrap().visible_body(), Some("пост"));

    assert_eq!(engine.topic_replied(TopicId(5)), 2);
    engine.topic_posts(TopicId(5), 1).await.unwrap();
    engine.topic_posts(TopicId(6), 1).await.unwrap();
    assert_eq!(transport.calls(&Request::Topic { id: TopicId(5), page: 1 }), 2);
    assert_eq!(transport.calls(&Request::Topic { id: TopicId(6), page: 1 }), 1);
}

#[tokio::test(start_paused = true)]
async fn forum_topics_and_stats() {
    let transport = Arc::new(MockTransport::new());
    let topic = json!([5, "Подвеска", 3, 12, "Ремонт", 77, "mechanic", 41, 1_731_000_000u64]);
    transport.respond(Request::Forum { id: ForumId(12), page: 1 }, json!([0, 1, 1, [topic]]).to_string());
    let engine = engine(&transport);

    let topics = engine.forum_topics(ForumId(12), 1).await.unwrap();
    assert_eq!(topics.succeeded[0].forum.id, ForumId(12));
    engine.forum_topics(ForumId(12), 1).await.unwrap();

    let stats = engine.cache_stats();
    let (_, forums) = stats.iter().find(|(name, _)| *name == "forums").unwrap();
    assert_eq!(forums.misses, 1);
    assert_eq!(forums.hits, 1);
    assert!(!engine.invalidate(&CacheKey::User(1)));
}
