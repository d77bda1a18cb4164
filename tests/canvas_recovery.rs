mod support;

use std::collections::BTreeMap;

use pixelwar::application::snapshot::{CanvasError, WarmReport};
use pixelwar::cache::{CANVAS_HASH, FastCache};
use pixelwar::domain::canvas::{CanvasSnapshot, Coordinate};
use pixelwar::domain::palette::Color;
use uuid::Uuid;

use support::{command, contributor, harness, placement};

/// What a viewer can see per cell, independent of timestamp encoding.
fn visible(snapshot: &CanvasSnapshot) -> BTreeMap<Coordinate, (Uuid, Color, String)> {
    snapshot
        .iter()
        .map(|(coordinate, placement)| {
            (
                *coordinate,
                (
                    placement.id,
                    placement.color,
                    placement.contributor.to_string(),
                ),
            )
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn snapshot_survives_a_cache_flush() {
    let h = harness();
    for (name, x) in [("alice", 1), ("bob", 2), ("carol", 3)] {
        h.placements
            .submit(&contributor(name), command(x, x, "#00A368", name))
            .await
            .expect("placement accepted");
    }
    tokio::time::advance(support::WINDOW).await;
    h.placements
        .submit(&contributor("alice"), command(2, 2, "#BE0039", "alice"))
        .await
        .expect("overwrite bob's cell");

    let before = visible(&h.canvas.snapshot().await.expect("snapshot before flush"));
    h.cache.flush();
    let after = visible(&h.canvas.snapshot().await.expect("snapshot after flush"));

    assert_eq!(before, after);
    assert_eq!(
        after.get(&Coordinate::new(2, 2)).map(|(_, color, who)| (*color, who.as_str())),
        Some((Color::DarkRed, "alice"))
    );
}

#[tokio::test]
async fn placement_after_flush_shadows_the_durable_row() {
    let h = harness();
    h.placements
        .submit(&contributor("alice"), command(4, 4, "#FFFFFF", "alice"))
        .await
        .expect("first placement");
    h.cache.flush();

    h.placements
        .submit(&contributor("bob"), command(4, 4, "#000000", "bob"))
        .await
        .expect("bob overwrites after the flush");

    let snapshot = h.canvas.snapshot().await.expect("snapshot");
    let cell = snapshot.get(Coordinate::new(4, 4)).expect("cell present");
    assert_eq!(cell.color, Color::Black);
    assert_eq!(cell.contributor.as_str(), "bob");
}

#[tokio::test]
async fn warm_cache_fills_only_missing_cells() {
    let h = harness();
    h.repo.seed(placement(0, 0, Color::Teal, "alice")).await;
    h.repo.seed(placement(1, 0, Color::Teal, "alice")).await;

    let fresher = placement(1, 0, Color::Indigo, "bob");
    h.cache
        .hash_set(
            CANVAS_HASH,
            "1:0",
            serde_json::to_string(&fresher).expect("encode"),
        )
        .await
        .expect("seed cache");

    let report = h.canvas.warm_cache().await.expect("warm cache");
    assert_eq!(
        report,
        WarmReport {
            written: 1,
            skipped: 1
        }
    );

    let snapshot = h.canvas.snapshot().await.expect("snapshot");
    assert_eq!(
        snapshot.get(Coordinate::new(1, 0)).map(|p| p.id),
        Some(fresher.id)
    );
    assert_eq!(
        snapshot.get(Coordinate::new(0, 0)).map(|p| p.color),
        Some(Color::Teal)
    );
}

#[tokio::test]
async fn cell_falls_back_to_the_durable_log() {
    let h = harness();
    let accepted = h
        .placements
        .submit(&contributor("alice"), command(9, 9, "#51E9F4", "alice"))
        .await
        .expect("placement accepted");

    h.cache.flush();
    let cell = h
        .canvas
        .cell(Coordinate::new(9, 9))
        .await
        .expect("read cell")
        .expect("durable row");
    assert_eq!(cell.id, accepted.id);

    assert!(
        h.canvas
            .cell(Coordinate::new(8, 8))
            .await
            .expect("read empty cell")
            .is_none()
    );
}

#[tokio::test]
async fn history_is_newest_first_and_limited() {
    let h = harness();
    let colors = [Color::Red, Color::Orange, Color::Yellow, Color::Green];
    for color in colors {
        h.repo.seed(placement(6, 6, color, "alice")).await;
    }
    h.repo.seed(placement(6, 7, Color::Black, "bob")).await;

    let history = h
        .canvas
        .history(Coordinate::new(6, 6), Some(3))
        .await
        .expect("history");
    let seen: Vec<Color> = history.iter().map(|p| p.color).collect();
    assert_eq!(seen, vec![Color::Green, Color::Yellow, Color::Orange]);

    let everything = h
        .canvas
        .history(Coordinate::new(6, 6), None)
        .await
        .expect("default limit");
    assert_eq!(everything.len(), 4);
}

#[tokio::test]
async fn snapshot_uses_the_durable_log_while_the_cache_is_down() {
    let h = harness();
    h.repo.seed(placement(2, 3, Color::Periwinkle, "alice")).await;
    h.cache.set_available(false);

    let snapshot = h.canvas.snapshot().await.expect("snapshot");
    assert_eq!(
        snapshot.get(Coordinate::new(2, 3)).map(|p| p.color),
        Some(Color::Periwinkle)
    );
}

#[tokio::test]
async fn snapshot_fails_when_the_durable_log_is_down() {
    let h = harness();
    h.repo.set_fail_reads(true);

    let err = h.canvas.snapshot().await.expect_err("durable read fails");
    assert!(matches!(err, CanvasError::Repo(_)));
}
