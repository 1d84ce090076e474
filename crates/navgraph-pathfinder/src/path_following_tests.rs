//! End-to-end scenarios for the follow loop
//!
//! Agents are simulated frame by frame on grid graphs. A `CanGo` doubles as
//! the world's collision: moves it rejects are not applied.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use navgraph::{
        AgentId, GraphManager, GraphTraversal, GridGraphBuilder, Path, PathNodeId, SearchOutcome,
        Status, StepBudget, TraversalState, VertexRef,
    };
    use navgraph_common::{Error, Result, Vec3};

    use crate::{
        Accident, Action, AgentState, CanGo, CanGoAlways, ComputeTargetPoint, DetectAccident,
        FrameContext, Goto, GotoTrivial, ModifierConfig, ModifierRegistry, Modifiers, NextMove,
        PathFinder, PathFinderConfig, PathFinderError, PathStatus, SteeringSimpleBiped,
    };

    const DT: f32 = 0.1;

    /// Wall along x = 1.5 for z below 0.6
    struct WallSegment;

    impl CanGo for WallSegment {
        fn can_go(&self, _agent: &AgentState, from: Vec3, to: Vec3) -> bool {
            const WALL_X: f32 = 1.5;
            if (from.x < WALL_X) == (to.x < WALL_X) {
                return true;
            }
            let t = (WALL_X - from.x) / (to.x - from.x);
            let z = from.z + t * (to.z - from.z);
            z >= 0.6
        }
    }

    /// Only short moves are allowed
    struct CanGoWithin(f32);

    impl CanGo for CanGoWithin {
        fn can_go(&self, _agent: &AgentState, from: Vec3, to: Vec3) -> bool {
            navgraph_common::dist_2d(&from, &to) <= self.0
        }
    }

    /// Counts accident checks and never reports one
    #[derive(Default)]
    struct CountingAccident(AtomicU32);

    impl CountingAccident {
        fn count(&self) -> u32 {
            self.0.load(Ordering::Relaxed)
        }
    }

    impl DetectAccident for CountingAccident {
        fn detect_accident(
            &self,
            _agent: &AgentState,
            _can_go: &dyn CanGo,
            _path: &Path,
            _current: PathNodeId,
        ) -> Option<Accident> {
            self.0.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Fails one call, steers normally otherwise
    struct FlakyGoto {
        calls: AtomicU32,
        fail_on: u32,
        inner: GotoTrivial,
    }

    impl Goto for FlakyGoto {
        fn goto(&self, agent: &AgentState, target: Vec3, dt: f32) -> Option<Action> {
            if self.calls.fetch_add(1, Ordering::Relaxed) == self.fail_on {
                return None;
            }
            self.inner.goto(agent, target, dt)
        }
    }

    struct NoTargetPoint;

    impl ComputeTargetPoint for NoTargetPoint {
        fn compute_target_point(
            &self,
            _agent: &AgentState,
            _can_go: &dyn CanGo,
            _path: &Path,
            _current: PathNodeId,
        ) -> Option<Vec3> {
            None
        }
    }

    struct Sim {
        graph: GraphManager,
        budget: StepBudget,
        now: f32,
    }

    impl Sim {
        fn new(graph: GraphManager, steps: u32) -> Self {
            Self {
                graph,
                budget: StepBudget::new(steps),
                now: 0.0,
            }
        }

        fn step(&mut self, finder: &mut PathFinder, agent: &AgentState, goal: Vec3) -> Result<NextMove> {
            self.budget.new_frame();
            let mut frame = FrameContext::new(&self.graph, &mut self.budget, self.now, DT);
            let next = finder.find_next_move(&mut frame, agent, goal);
            self.now += DT;
            next
        }

        fn step_at(&mut self, finder: &mut PathFinder, agent: &AgentState, goal: Vec3, now: f32) -> Result<NextMove> {
            self.now = now;
            self.step(finder, agent, goal)
        }

        /// Runs frames until the agent arrives; returns the number of frames
        fn run_to_arrival(
            &mut self,
            finder: &mut PathFinder,
            agent: &mut AgentState,
            goal: Vec3,
            world: &dyn CanGo,
            max_frames: usize,
        ) -> Result<usize> {
            for frame in 1..=max_frames {
                match self.step(finder, agent, goal)? {
                    NextMove::Arrived => return Ok(frame),
                    NextMove::Move(action) => {
                        let mut moved = *agent;
                        moved.apply(&action, DT);
                        if world.can_go(agent, agent.position, moved.position) {
                            *agent = moved;
                        } else if action.orientation != Vec3::ZERO {
                            agent.orientation = action.orientation;
                            agent.speed = 0.0;
                        }
                    }
                    NextMove::Waiting | NextMove::NoPath => {}
                }
            }
            Err(Error::Pathfinding(format!(
                "agent stuck at {:?} after {} frames",
                agent.position, max_frames
            )))
        }
    }

    fn path_vertices(path: &Path) -> Vec<VertexRef> {
        path.iter().filter_map(|node| node.vertex).collect()
    }

    #[test]
    fn test_follow_to_arrival_with_registry_modifiers() -> Result<()> {
        let grid = GridGraphBuilder::new(10, 10).with_cell_size(4);
        let mut sim = Sim::new(grid.build()?, 1000);

        let modifiers = ModifierRegistry::with_defaults()?.build(&ModifierConfig::default())?;
        let mut finder = PathFinder::new(PathFinderConfig::default(), modifiers)?;
        let mut agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(9, 9);

        let frames = sim.run_to_arrival(&mut finder, &mut agent, goal, &CanGoAlways, 500)?;

        assert!(frames > 10);
        assert_eq!(finder.path_status(), PathStatus::Arrived);
        assert!(finder.path().is_empty());
        assert_eq!(finder.replans(), 1);
        assert_eq!(finder.last_error(), None);
        assert!(agent.position.distance(goal) <= 0.5);

        // Staying on the goal keeps reporting arrival without new requests
        assert_eq!(sim.step(&mut finder, &agent, goal)?, NextMove::Arrived);
        assert_eq!(finder.replans(), 1);
        Ok(())
    }

    #[test]
    fn test_short_trip_uses_the_direct_way() -> Result<()> {
        let grid = GridGraphBuilder::new(4, 4);
        let mut sim = Sim::new(grid.build()?, 1000);
        let mut finder = PathFinder::new(PathFinderConfig::default(), Modifiers::default())?;
        let agent = AgentState::new(AgentId(1), Vec3::new(0.2, 0.0, 0.2));
        let goal = Vec3::new(2.0, 0.0, 1.5);

        assert!(matches!(sim.step(&mut finder, &agent, goal)?, NextMove::Move(_)));
        assert_eq!(finder.path_status(), PathStatus::Following);
        assert!(path_vertices(finder.path()).is_empty());
        assert_eq!(finder.search().state(), TraversalState::Idle);
        Ok(())
    }

    #[test]
    fn test_accident_marks_edge_taboo_and_detours() -> Result<()> {
        let grid = GridGraphBuilder::new(5, 3);
        let mut sim = Sim::new(grid.build()?, 1000);
        let blocked_from = grid.vertex_at(&sim.graph, 1, 0)?;
        let blocked_to = grid.vertex_at(&sim.graph, 2, 0)?;

        let modifiers = Modifiers::default().with_can_go(Arc::new(WallSegment));
        let mut finder = PathFinder::new(PathFinderConfig::default(), modifiers)?;
        let mut agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(4, 0);

        sim.run_to_arrival(&mut finder, &mut agent, goal, &WallSegment, 3000)?;

        assert_eq!(finder.taboo_edges().status(blocked_from, blocked_to), Some(false));
        assert!(finder.replans() >= 2);
        assert_eq!(finder.path_status(), PathStatus::Arrived);
        Ok(())
    }

    #[test]
    fn test_blocking_a_path_edge_replans_around_it() -> Result<()> {
        let grid = GridGraphBuilder::new(5, 3);
        let mut sim = Sim::new(grid.build()?, 1000);
        let mut finder = PathFinder::new(PathFinderConfig::default(), Modifiers::default())?;
        let agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(4, 2);
        let start = grid.vertex_at(&sim.graph, 0, 0)?;

        sim.step(&mut finder, &agent, goal)?;
        assert_eq!(finder.path_status(), PathStatus::Following);
        let remaining = path_vertices(finder.path());
        let (from, to) = (remaining[remaining.len() - 2], remaining[remaining.len() - 1]);

        // Edges off the remaining path do not trigger a replan
        let elsewhere = (grid.vertex_at(&sim.graph, 4, 0)?, grid.vertex_at(&sim.graph, 3, 0)?);
        assert!(finder.set_edge_status(elsewhere.0, elsewhere.1, false, sim.now));
        sim.step(&mut finder, &agent, goal)?;
        assert_eq!(finder.replans(), 1);

        assert!(finder.set_edge_status(from, to, false, sim.now));
        assert!(!finder.set_edge_status(from, to, false, sim.now));
        sim.step(&mut finder, &agent, goal)?;

        assert_eq!(finder.replans(), 2);
        let detour = path_vertices(&finder.search().build_path(&sim.graph)?);
        assert_eq!(detour[0], start);
        assert_eq!(detour.last(), Some(&to));
        assert!(detour.windows(2).all(|pair| pair != [from, to]));
        Ok(())
    }

    #[test]
    fn test_time_sliced_search_waits() -> Result<()> {
        let grid = GridGraphBuilder::new(10, 10);
        let mut sim = Sim::new(grid.build()?, 2);
        let mut finder = PathFinder::new(PathFinderConfig::default(), Modifiers::default())?;
        let agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(9, 9);

        assert_eq!(sim.step(&mut finder, &agent, goal)?, NextMove::Waiting);
        assert_eq!(finder.path_status(), PathStatus::Searching);

        let mut frames = 1;
        while !matches!(sim.step(&mut finder, &agent, goal)?, NextMove::Move(_)) {
            assert_eq!(finder.path_status(), PathStatus::Searching);
            frames += 1;
            assert!(frames < 1000);
        }

        assert!(frames > 10);
        assert_eq!(finder.replans(), 1);
        assert_eq!(finder.path_status(), PathStatus::Following);
        Ok(())
    }

    #[test]
    fn test_missing_nodes_wait_and_retry() -> Result<()> {
        let grid = GridGraphBuilder::new(4, 4);
        let mut sim = Sim::new(grid.build()?, 1000);
        let mut finder = PathFinder::new(PathFinderConfig::default(), Modifiers::default())?;

        let lost = AgentState::new(AgentId(1), Vec3::new(100.0, 0.0, 100.0));
        assert_eq!(sim.step(&mut finder, &lost, grid.position(3, 3))?, NextMove::Waiting);
        assert_eq!(finder.last_error(), Some(PathFinderError::StartNotFound));
        assert_eq!(sim.step(&mut finder, &lost, grid.position(3, 3))?, NextMove::Waiting);
        assert_eq!(finder.replans(), 2);

        let mut finder = PathFinder::new(PathFinderConfig::default(), Modifiers::default())?;
        let agent = AgentState::new(AgentId(2), grid.position(0, 0));
        assert_eq!(sim.step(&mut finder, &agent, Vec3::new(50.0, 0.0, 50.0))?, NextMove::Waiting);
        assert_eq!(finder.last_error(), Some(PathFinderError::DestinationNotFound));
        assert_eq!(
            finder.last_error().map(|e| e.status()),
            Some(Status::NotFound)
        );
        Ok(())
    }

    #[test]
    fn test_failed_search_respects_cooldown() -> Result<()> {
        let grid = GridGraphBuilder::new(6, 1).without_edge((4, 0), (5, 0));
        let mut sim = Sim::new(grid.build()?, 1000);
        let config = PathFinderConfig::default().with_astar_new_attempt_period(1.0);
        let mut finder = PathFinder::new(config, Modifiers::default())?;
        let agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(5, 0);

        assert_eq!(sim.step(&mut finder, &agent, goal)?, NextMove::NoPath);
        assert_eq!(finder.path_status(), PathStatus::Failed);
        assert!(matches!(
            finder.last_error(),
            Some(PathFinderError::SearchFailed(outcome)) if outcome != SearchOutcome::Found
        ));

        // Within the attempt period nothing is searched
        for _ in 0..5 {
            assert_eq!(sim.step(&mut finder, &agent, goal)?, NextMove::NoPath);
        }
        assert_eq!(finder.replans(), 1);

        sim.now += 1.0;
        assert_eq!(sim.step(&mut finder, &agent, goal)?, NextMove::NoPath);
        assert_eq!(finder.replans(), 2);

        // A new goal is tried at once
        assert!(matches!(
            sim.step(&mut finder, &agent, grid.position(3, 0))?,
            NextMove::Move(_)
        ));
        assert_eq!(finder.replans(), 3);
        Ok(())
    }

    #[test]
    fn test_path_through_unloaded_cell_is_replanned() -> Result<()> {
        let grid = GridGraphBuilder::new(12, 4).with_cell_size(4);
        let mut sim = Sim::new(grid.build()?, 1000);
        // Short sight keeps the remaining path long enough to cross the middle cell
        let modifiers = Modifiers::default().with_can_go(Arc::new(CanGoWithin(1.5)));
        let mut finder = PathFinder::new(PathFinderConfig::default(), modifiers)?;
        let agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(11, 0);

        assert!(matches!(sim.step(&mut finder, &agent, goal)?, NextMove::Move(_)));
        assert_eq!(finder.replans(), 1);

        let middle = sim.graph.find_cell(1).ok_or(Error::Graph("missing cell".into()))?;
        let data = sim.graph.remove_cell(middle)?;

        assert_eq!(sim.step(&mut finder, &agent, goal)?, NextMove::NoPath);
        assert_eq!(finder.replans(), 2);
        assert!(finder.path().is_empty());

        sim.graph.add_cell(data)?;
        sim.now += 1.0;
        assert!(matches!(sim.step(&mut finder, &agent, goal)?, NextMove::Move(_)));
        assert_eq!(finder.replans(), 3);
        assert!(path_vertices(finder.path())
            .into_iter()
            .all(|v| sim.graph.is_valid_vertex_ref(v)));
        Ok(())
    }

    #[test]
    fn test_injected_path_is_followed() -> Result<()> {
        let grid = GridGraphBuilder::new(4, 4);
        let mut sim = Sim::new(grid.build()?, 1000);
        let mut finder = PathFinder::new(PathFinderConfig::default(), Modifiers::default())?;
        let mut agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(1, 1);

        finder.inject_path(Path::from_positions([
            grid.position(0, 0),
            grid.position(1, 0),
            grid.position(1, 1),
        ]));
        assert_eq!(finder.path_status(), PathStatus::Following);

        sim.run_to_arrival(&mut finder, &mut agent, goal, &CanGoAlways, 200)?;
        assert_eq!(finder.replans(), 0);

        finder.reset();
        assert_eq!(finder.path_status(), PathStatus::None);
        assert_eq!(finder.goal(), None);
        assert!(finder.taboo_edges().is_empty());
        Ok(())
    }

    #[test]
    fn test_accident_checks_back_off_while_starved() -> Result<()> {
        let grid = GridGraphBuilder::new(10, 1);
        let mut sim = Sim::new(grid.build()?, 1000);
        let checks = Arc::new(CountingAccident::default());
        let modifiers = Modifiers::default()
            .with_check_direct_way(None)
            .with_detect_accident(checks.clone());
        let config = PathFinderConfig::default()
            .with_accident_check_period(0.5)
            .with_max_accident_check_period(4.0);
        let follow_task = config.follow_task;
        let mut finder = PathFinder::new(config, modifiers)?;
        let agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(9, 0);

        // Times are multiples of 0.25 so the schedule is exact
        assert!(matches!(sim.step_at(&mut finder, &agent, goal, 0.0)?, NextMove::Move(_)));
        assert_eq!(checks.count(), 0);
        sim.step_at(&mut finder, &agent, goal, 0.25)?;
        assert_eq!(checks.count(), 1);
        assert_eq!(finder.accident_check_period(), 0.5);

        // Without follow budget each due check doubles the period, up to the ceiling
        sim.budget.set_task_steps(follow_task, 0);
        let mut period = 0.5;
        for (due, doubled) in [(0.75, 1.0), (1.75, 2.0), (3.75, 4.0), (7.75, 4.0)] {
            sim.step_at(&mut finder, &agent, goal, due - 0.25)?;
            assert_eq!(finder.accident_check_period(), period);
            sim.step_at(&mut finder, &agent, goal, due)?;
            assert_eq!(finder.accident_check_period(), doubled);
            period = doubled;
        }
        assert_eq!(checks.count(), 1);
        assert_eq!(finder.path_status(), PathStatus::Following);

        // Next check is due at 7.75 + 4; with budget back the period resets
        sim.budget.set_task_steps(follow_task, 1000);
        sim.step_at(&mut finder, &agent, goal, 11.5)?;
        assert_eq!(checks.count(), 1);
        sim.step_at(&mut finder, &agent, goal, 11.75)?;
        assert_eq!(checks.count(), 2);
        assert_eq!(finder.accident_check_period(), 0.5);

        sim.step_at(&mut finder, &agent, goal, 12.0)?;
        assert_eq!(checks.count(), 2);
        sim.step_at(&mut finder, &agent, goal, 12.25)?;
        assert_eq!(checks.count(), 3);
        assert_eq!(finder.replans(), 1);
        Ok(())
    }

    #[test]
    fn test_failed_goto_keeps_the_path_and_retries() -> Result<()> {
        let grid = GridGraphBuilder::new(5, 1);
        let mut sim = Sim::new(grid.build()?, 1000);
        let goto = FlakyGoto {
            calls: AtomicU32::new(0),
            fail_on: 1,
            inner: GotoTrivial::new(Arc::new(SteeringSimpleBiped::default())),
        };
        let modifiers = Modifiers::default()
            .with_check_direct_way(None)
            .with_goto(Arc::new(goto));
        let mut finder = PathFinder::new(PathFinderConfig::default(), modifiers)?;
        let agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(4, 0);

        assert!(matches!(sim.step(&mut finder, &agent, goal)?, NextMove::Move(_)));
        let positions = finder.path().positions();
        let current = finder.current_node();
        assert!(current.is_some());

        let failed = sim.step(&mut finder, &agent, goal);
        assert!(matches!(failed, Err(Error::Pathfinding(_))));
        assert_eq!(finder.last_error(), Some(PathFinderError::GotoFailed));
        assert_eq!(finder.last_error().map(|e| e.status()), Some(Status::Failure));
        assert_eq!(finder.path_status(), PathStatus::Following);
        assert_eq!(finder.path().positions(), positions);
        assert_eq!(finder.current_node(), current);
        assert_eq!(finder.replans(), 1);

        assert!(matches!(sim.step(&mut finder, &agent, goal)?, NextMove::Move(_)));
        assert_eq!(finder.replans(), 1);
        assert_eq!(finder.last_error(), None);
        Ok(())
    }

    #[test]
    fn test_missing_target_point_fails_the_frame_only() -> Result<()> {
        let grid = GridGraphBuilder::new(5, 1);
        let mut sim = Sim::new(grid.build()?, 1000);
        let modifiers = Modifiers::default()
            .with_check_direct_way(None)
            .with_compute_target_point(Arc::new(NoTargetPoint));
        let mut finder = PathFinder::new(PathFinderConfig::default(), modifiers)?;
        let agent = AgentState::new(AgentId(1), grid.position(0, 0));
        let goal = grid.position(4, 0);

        for _ in 0..3 {
            assert!(matches!(sim.step(&mut finder, &agent, goal), Err(Error::Pathfinding(_))));
            assert_eq!(finder.last_error(), Some(PathFinderError::NoTargetPoint));
            assert_eq!(finder.path_status(), PathStatus::Following);
            assert!(!finder.path().is_empty());
        }
        assert_eq!(finder.replans(), 1);
        Ok(())
    }
}
