use livesync_domain::record::Record;
use livesync_macros::record;

#[record(table = "comments", parent = post_id, order_by(created_at, seq), enriched(author))]
#[derive(Default)]
struct Comment {
    id: String,
    post_id: Option<String>,
    created_at: String,
    seq: u32,
    author: Option<String>,
}

fn main() {
    let c = Comment {
        id: "c-1".into(),
        created_at: "2025-01-01".into(),
        seq: 3,
        ..Default::default()
    };
    let key: (String, u32) = c.sort_key();
    assert_eq!(key, ("2025-01-01".to_string(), 3));
    assert_eq!(c.parent_id(), None);
    assert!(!c.is_hydrated());
}
