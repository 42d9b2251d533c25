//! World Setup
//!
//! Populates a registry, either from a configured roster or by scattering
//! generated agents over distinct random cells.

use grid_events::{GridBounds, Position};
use rand::Rng;
use tracing::{debug, info};

use crate::config::{AgentsConfig, RosterEntry};
use crate::error::{GridError, RegistryError};
use crate::registry::{Agent, AgentRegistry};

/// Random draws per agent before falling back to a scan for a free cell.
const SPAWN_ATTEMPTS: u32 = 64;

/// Identity for the `index`-th generated agent.
pub fn agent_name(index: usize) -> String {
    format!("agent_{:02}", index)
}

/// Builds the starting population described by `config`.
pub fn populate<R: Rng + ?Sized>(
    config: &AgentsConfig,
    bounds: &GridBounds,
    rng: &mut R,
) -> Result<AgentRegistry, RegistryError> {
    if config.roster.is_empty() {
        spawn_agents(config.count, bounds, rng)
    } else {
        register_roster(&config.roster, bounds)
    }
}

/// Places `count` idle agents on distinct cells chosen at random.
///
/// Fails if the grid has fewer cells than agents.
pub fn spawn_agents<R: Rng + ?Sized>(
    count: usize,
    bounds: &GridBounds,
    rng: &mut R,
) -> Result<AgentRegistry, RegistryError> {
    if !bounds.is_valid() {
        return Err(GridError::InvalidConfiguration(format!("invalid grid bounds {}", bounds)).into());
    }
    if count as u64 > bounds.cell_count() {
        return Err(GridError::InvalidConfiguration(format!(
            "{} agents do not fit on a {} grid",
            count, bounds
        ))
        .into());
    }

    let mut registry = AgentRegistry::new();
    for index in 0..count {
        let position = free_cell(&registry, bounds, rng).ok_or_else(|| {
            GridError::InvalidConfiguration(format!("no free cell left on {}", bounds))
        })?;
        let agent = registry.register(agent_name(index), position)?;
        debug!("Spawned {} at {}", agent.id, agent.position);
    }

    info!("Spawned {} agents on {}", registry.len(), bounds);
    Ok(registry)
}

/// Registers the roster as given. Shared cells are allowed.
pub fn register_roster(
    roster: &[RosterEntry],
    bounds: &GridBounds,
) -> Result<AgentRegistry, RegistryError> {
    let mut registry = AgentRegistry::new();
    for entry in roster {
        let position = entry.position();
        if !bounds.contains(&position) {
            return Err(GridError::OutOfBounds {
                position,
                bounds: *bounds,
            }
            .into());
        }
        let mut agent = Agent::new(entry.id.as_str(), position);
        if let Some(persona) = &entry.persona {
            agent = agent.with_persona(persona.as_str());
        }
        registry.insert(agent)?;
    }

    info!("Registered {} roster agents", registry.len());
    Ok(registry)
}

fn free_cell<R: Rng + ?Sized>(
    registry: &AgentRegistry,
    bounds: &GridBounds,
    rng: &mut R,
) -> Option<Position> {
    for _ in 0..SPAWN_ATTEMPTS {
        let candidate = Position::new(
            rng.gen_range(0..=bounds.x_max),
            rng.gen_range(0..=bounds.y_max),
        );
        if !registry.is_occupied(&candidate) {
            return Some(candidate);
        }
    }

    // Crowded grid: take the first free cell in row order
    (0..=bounds.y_max)
        .flat_map(|y| (0..=bounds.x_max).map(move |x| Position::new(x, y)))
        .find(|p| !registry.is_occupied(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_events::AgentId;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_spawn_distinct_cells() {
        let mut rng = SmallRng::seed_from_u64(42);
        let bounds = GridBounds::default();
        let registry = spawn_agents(10, &bounds, &mut rng).unwrap();

        assert_eq!(registry.len(), 10);
        let cells: HashSet<Position> = registry.all().iter().map(|a| a.position).collect();
        assert_eq!(cells.len(), 10);
        assert!(registry.all().iter().all(|a| bounds.contains(&a.position)));
        assert!(registry.contains(&AgentId::from("agent_00")));
        assert!(registry.contains(&AgentId::from("agent_09")));
    }

    #[test]
    fn test_spawn_fills_small_grid() {
        let mut rng = SmallRng::seed_from_u64(1);
        let bounds = GridBounds::new(1, 1);
        let registry = spawn_agents(4, &bounds, &mut rng).unwrap();
        let cells: HashSet<Position> = registry.all().iter().map(|a| a.position).collect();
        assert_eq!(cells.len(), 4);

        let err = spawn_agents(5, &bounds, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Grid(GridError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_spawn_is_seeded() {
        let bounds = GridBounds::default();
        let a = spawn_agents(6, &bounds, &mut SmallRng::seed_from_u64(9)).unwrap();
        let b = spawn_agents(6, &bounds, &mut SmallRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.all(), b.all());
    }

    #[test]
    fn test_roster() {
        let roster = vec![
            RosterEntry {
                id: "william".to_string(),
                x: 5,
                y: 5,
                persona: Some("Friendly and helpful.".to_string()),
            },
            RosterEntry {
                id: "emma".to_string(),
                x: 5,
                y: 5,
                persona: None,
            },
        ];
        let registry = register_roster(&roster, &GridBounds::default()).unwrap();
        let william = registry.get(&AgentId::from("william")).unwrap();
        assert_eq!(william.persona.as_deref(), Some("Friendly and helpful."));
        assert_eq!(registry.len(), 2);

        let mut dup = roster.clone();
        dup[1].id = "william".to_string();
        assert!(matches!(
            register_roster(&dup, &GridBounds::default()),
            Err(RegistryError::DuplicateIdentity(_))
        ));

        let mut outside = roster;
        outside[0].x = 40;
        assert!(matches!(
            register_roster(&outside, &GridBounds::default()),
            Err(RegistryError::Grid(GridError::OutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_populate_prefers_roster() {
        let config = AgentsConfig {
            count: 7,
            roster: vec![RosterEntry {
                id: "solo".to_string(),
                x: 0,
                y: 0,
                persona: None,
            }],
        };
        let mut rng = SmallRng::seed_from_u64(3);
        let registry = populate(&config, &GridBounds::default(), &mut rng).unwrap();
        assert_eq!(registry.len(), 1);
    }
}
