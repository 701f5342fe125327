use livesync_domain::record::Record;
use livesync_macros::record;

#[record(table = "teams", order_by(name))]
struct TeamSummary {
    id: String,
    name: String,
}

#[record(
    table = "events",
    columns = "*, home_team:teams!home_team_id(id, name)",
    parent = home_team_id,
    order_by(starts_at),
    enriched(home_team = home_team_id, away_team = away_team_id)
)]
struct Fixture {
    id: String,
    starts_at: String,
    home_team_id: String,
    away_team_id: Option<String>,
    home_team: Option<TeamSummary>,
    away_team: Option<TeamSummary>,
}

fn main() {
    let mut fixture = Fixture {
        id: "f-1".into(),
        starts_at: "2025-03-01T10:00:00Z".into(),
        home_team_id: "t-1".into(),
        away_team_id: None,
        home_team: None,
        away_team: None,
    };
    assert_eq!(Fixture::PARENT_COLUMN, Some("home_team_id"));
    assert_eq!(fixture.parent_id(), Some("t-1"));
    assert!(!fixture.is_hydrated());

    fixture.home_team = Some(TeamSummary {
        id: "t-1".into(),
        name: "Harriers".into(),
    });
    assert!(fixture.is_hydrated());
}
