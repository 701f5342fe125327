use livesync_domain::record::Record;
use livesync_macros::record;

#[record(table = "teams", order_by(name), required(name))]
struct Team {
    id: String,
    name: String,
}

fn main() {
    let team = Team {
        id: "t-1".into(),
        name: "Harriers".into(),
    };
    assert_eq!(Team::TABLE, "teams");
    assert_eq!(Team::COLUMNS, "*");
    assert_eq!(Team::PARENT_COLUMN, None);
    assert_eq!(Team::REQUIRED, &["name"]);
    assert_eq!(team.id(), "t-1");
    assert_eq!(team.sort_key(), "Harriers");
    assert!(team.parent_id().is_none());
    assert!(team.is_hydrated());
    let _ = format!("{:?}", team.clone());
}
