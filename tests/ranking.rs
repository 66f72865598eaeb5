/// Rank and leaderboard behaviour over settled runs.
mod common;

use common::{fixture, user};
use perkup_runner::ranking::RankingService;
use perkup_runner::storage::SessionReport;

fn score(value: u64) -> SessionReport {
    SessionReport {
        score: value,
        distance: value,
        duration_seconds: 600,
        max_multiplier: 1,
        ..Default::default()
    }
}

#[test]
fn higher_score_ranks_first() {
    let fx = fixture();
    let ranking = RankingService::new(fx.store.clone());
    fx.ledger.register(&user(1, "Top")).unwrap();
    fx.ledger.register(&user(2, "Second")).unwrap();
    fx.ledger.record_session(1, &score(300)).unwrap();
    fx.ledger.record_session(2, &score(100)).unwrap();

    assert_eq!(ranking.rank(1).unwrap(), Some(1));
    assert_eq!(ranking.rank(2).unwrap(), Some(2));
}

#[test]
fn unknown_player_has_no_rank() {
    let fx = fixture();
    let ranking = RankingService::new(fx.store.clone());
    assert_eq!(ranking.rank(77).unwrap(), None);
}

#[test]
fn lone_player_without_score_ranks_first() {
    let fx = fixture();
    let ranking = RankingService::new(fx.store.clone());
    fx.ledger.register(&user(3, "Fresh")).unwrap();
    assert_eq!(ranking.rank(3).unwrap(), Some(1));
    assert!(ranking.leaderboard(10).unwrap().is_empty());
}

#[test]
fn equal_scores_share_a_rank() {
    let fx = fixture();
    let ranking = RankingService::new(fx.store.clone());
    for (id, s) in [(1, 300), (2, 100), (3, 100), (4, 50)] {
        fx.ledger.register(&user(id, "P")).unwrap();
        fx.ledger.record_session(id, &score(s)).unwrap();
    }
    let ranks: Vec<_> = (1..=4).map(|id| ranking.rank(id).unwrap()).collect();
    assert_eq!(ranks, vec![Some(1), Some(2), Some(2), Some(4)]);
}

#[test]
fn leaderboard_orders_and_truncates() {
    let fx = fixture();
    let ranking = RankingService::new(fx.store.clone());
    for (id, s) in [(1, 20), (2, 900), (3, 0), (4, 450)] {
        fx.ledger.register(&user(id, "P")).unwrap();
        fx.ledger.record_session(id, &score(s)).unwrap();
    }

    let board = ranking.leaderboard(10).unwrap();
    let ids: Vec<_> = board.iter().map(|p| p.platform_id).collect();
    assert_eq!(ids, vec![2, 4, 1]);

    let top_two = ranking.leaderboard(2).unwrap();
    assert_eq!(top_two.len(), 2);
    assert_eq!(top_two[0].high_score, 900);
}

#[test]
fn improving_a_score_moves_the_player_up() {
    let fx = fixture();
    let ranking = RankingService::new(fx.store.clone());
    fx.ledger.register(&user(1, "A")).unwrap();
    fx.ledger.register(&user(2, "B")).unwrap();
    fx.ledger.record_session(1, &score(200)).unwrap();
    fx.ledger.record_session(2, &score(100)).unwrap();
    assert_eq!(ranking.rank(2).unwrap(), Some(2));

    fx.ledger.record_session(2, &score(250)).unwrap();
    assert_eq!(ranking.rank(2).unwrap(), Some(1));
    assert_eq!(ranking.rank(1).unwrap(), Some(2));
    assert_eq!(ranking.leaderboard(10).unwrap().len(), 2);
}
