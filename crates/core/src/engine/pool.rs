use std::collections::HashMap;

use super::config::EngineConfig;
use super::engine::EffectsEngine;
use crate::config::Show;
use crate::schedule::{active_show_ids, ScheduleVector};

/// One live engine per distinct nonzero show id in the final schedule.
#[derive(Default)]
pub struct EnginePool {
    engines: HashMap<u32, EffectsEngine>,
}

impl EnginePool {
    pub fn new() -> Self {
        EnginePool::default()
    }

    /// Bring the pool in line with the latest schedule: drop engines whose
    /// id left the schedule, create engines for ids that appeared. The show
    /// id doubles as the engine's permutation seed so the `random` direction
    /// stays stable across reconciles.
    pub fn reconcile(&mut self, schedule: &ScheduleVector, shows: &[Show]) {
        let wanted = active_show_ids(schedule);

        self.engines.retain(|id, _| wanted.contains(id));

        for id in wanted {
            if self.engines.contains_key(&id) {
                continue;
            }
            let engine = match shows.iter().find(|s| s.id == id) {
                Some(show) => match EngineConfig::from_show(show) {
                    Ok(config) => EffectsEngine::new(config, id as u64),
                    Err(error) => {
                        log::warn!("show {id} unusable ({error}), rendering gray");
                        EffectsEngine::fallback(id as u64)
                    }
                },
                None => {
                    log::debug!("no show record for id {id}, using the default config");
                    EffectsEngine::new(EngineConfig::gray(), id as u64)
                }
            };
            self.engines.insert(id, engine);
        }
    }

    /// Advance every live engine one frame.
    pub fn run_all(&mut self) {
        for engine in self.engines.values_mut() {
            engine.run();
        }
    }

    pub fn engine_mut(&mut self, id: u32) -> Option<&mut EffectsEngine> {
        self.engines.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.engines.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn any_degraded(&self) -> bool {
        self.engines.values().any(|e| e.degraded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ENGINE_VERSION_2A;
    use crate::schedule::{normalize, ZoneShows};
    use attitude_fixtures::Rgb;
    use serde_json::json;

    fn chase_show(id: u32) -> Show {
        Show {
            id,
            engine_version: ENGINE_VERSION_2A.to_string(),
            show_type: json!("chase"),
            direction: json!("lr"),
            speed: 60.0,
            size: 50,
            splits: 1,
            transition: "both".to_string(),
            transition_width: 0.0,
            bounce: false,
            colors: vec![Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)],
        }
    }

    fn schedule_of(ids: [u32; 3]) -> ScheduleVector {
        normalize(ids.into_iter().map(ZoneShows::Single).collect())
    }

    #[test]
    fn test_pool_tracks_schedule_membership() {
        let shows = vec![chase_show(10), chase_show(20)];
        let mut pool = EnginePool::new();

        pool.reconcile(&schedule_of([10, 20, 0]), &shows);
        assert_eq!(pool.len(), 2);
        assert!(pool.contains(10) && pool.contains(20));

        pool.reconcile(&schedule_of([10, 0, 0]), &shows);
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(20));

        pool.reconcile(&schedule_of([0, 0, 0]), &shows);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_group_vectors_are_flattened() {
        let shows = vec![chase_show(5), chase_show(7)];
        let mut schedule = schedule_of([0, 0, 0]);
        schedule[0] = ZoneShows::Groups(vec![5, 0, 7]);

        let mut pool = EnginePool::new();
        pool.reconcile(&schedule, &shows);
        assert!(pool.contains(5) && pool.contains(7));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_unknown_show_id_gets_default_config() {
        let mut pool = EnginePool::new();
        pool.reconcile(&schedule_of([99, 0, 0]), &[]);
        assert!(pool.contains(99));
        assert!(!pool.any_degraded());

        let engine = pool.engine_mut(99).unwrap();
        engine.run();
        engine.set_fixture_count(1);
        assert_eq!(engine.fixture_color(0), Rgb::GRAY);
    }

    #[test]
    fn test_untranslatable_show_degrades_to_gray() {
        let mut bad = chase_show(4);
        bad.engine_version = "1".to_string();
        bad.show_type = json!(42);

        let mut pool = EnginePool::new();
        pool.reconcile(&schedule_of([4, 0, 0]), &[bad]);
        assert!(pool.any_degraded());
    }

    #[test]
    fn test_surviving_engines_keep_their_counters() {
        let shows = vec![chase_show(10)];
        let mut pool = EnginePool::new();
        pool.reconcile(&schedule_of([10, 0, 0]), &shows);

        pool.run_all();
        pool.run_all();
        assert_eq!(pool.engine_mut(10).unwrap().frame(), 2);

        pool.reconcile(&schedule_of([10, 0, 0]), &shows);
        assert_eq!(pool.engine_mut(10).unwrap().frame(), 2);
    }
}
