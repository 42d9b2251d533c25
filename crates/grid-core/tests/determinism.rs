//! Determinism verification tests
//!
//! The same seed must produce the same movement, proximity and spawn layout.

use grid_core::{
    spawn_agents, AgentRegistry, ConversationCoordinator, ConversationStore, CoordinatorSettings,
    EngineSettings, GridMover, MemoryBackend, ProximityDetector, ScriptedModel, TickEngine,
};
use grid_events::{GridBounds, Position, ProximityPair};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn engine() -> TickEngine<ScriptedModel, MemoryBackend> {
    let coordinator = ConversationCoordinator::new(
        ScriptedModel::new(),
        ConversationStore::in_memory(),
        CoordinatorSettings::default(),
    );
    TickEngine::new(
        EngineSettings::default(),
        GridMover::default(),
        ProximityDetector::default(),
        coordinator,
    )
    .unwrap()
}

/// Positions after every tick, plus the pairs detected along the way.
async fn simulate(seed: u64, ticks: u64) -> (Vec<Vec<Position>>, Vec<Vec<ProximityPair>>) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut registry = spawn_agents(8, &GridBounds::new(6, 6), &mut rng).unwrap();
    let engine = engine();

    let mut positions = Vec::new();
    let mut pairs = Vec::new();
    for tick in 1..=ticks {
        let report = engine.step(&mut registry, &mut rng, tick).await;
        positions.push(registry.all().iter().map(|a| a.position).collect());
        pairs.push(report.proximity);
    }
    (positions, pairs)
}

#[tokio::test]
async fn test_same_seed_same_run() {
    let (positions1, pairs1) = simulate(42, 20).await;
    let (positions2, pairs2) = simulate(42, 20).await;

    assert_eq!(positions1, positions2, "Movement should be identical with same seed");
    assert_eq!(pairs1, pairs2, "Proximity should be identical with same seed");
}

#[tokio::test]
async fn test_different_seeds_diverge() {
    let (positions1, _) = simulate(42, 20).await;
    let (positions2, _) = simulate(43, 20).await;

    assert_ne!(positions1, positions2, "Different seeds should produce different runs");
}

#[test]
fn test_spawn_layout_determinism() {
    let bounds = GridBounds::default();
    let layout = |seed: u64| -> Vec<Position> {
        let mut rng = SmallRng::seed_from_u64(seed);
        spawn_agents(12, &bounds, &mut rng)
            .unwrap()
            .all()
            .iter()
            .map(|a| a.position)
            .collect()
    };

    assert_eq!(layout(7), layout(7));
}

#[test]
fn test_move_all_determinism() {
    let bounds = GridBounds::default();
    let walk = |seed: u64| -> Vec<Position> {
        let mut registry = AgentRegistry::new();
        registry.register("walker", Position::new(17, 10)).unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..100)
            .map(|_| {
                registry
                    .move_all(&GridMover::default(), &mut rng, &bounds)
                    .unwrap()[0]
                    .to
            })
            .collect()
    };

    assert_eq!(walk(12345), walk(12345));
}
