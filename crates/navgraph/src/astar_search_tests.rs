//! End-to-end A* scenarios on grid graphs
//!
//! Covers the expected outcomes on small grids, the open-list tie-break, the
//! search bounds, and optimality against a brute-force Dijkstra.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::test_graph_helpers::{dijkstra, path_cost, random_grid, CountingVisitor};
    use crate::{
        find_path, AstarTraversal, AstarTraversalConfig, Constraint, EuclideanHeuristic,
        GraphTraversal, GridGraphBuilder, Heuristic, SearchOutcome, ShortestPathConstraint,
        TraversalState, UnlimitedBudget, VertexStatus,
    };
    use navgraph_common::{Error, Result, Vec3};

    fn run(
        grid: &GridGraphBuilder,
        graph: &crate::GraphManager,
        from: (u32, u32),
        to: (u32, u32),
        config: AstarTraversalConfig,
    ) -> Result<AstarTraversal> {
        let mut search = AstarTraversal::new(config)?;
        search.set_endpoints(
            grid.vertex_at(graph, from.0, from.1)?,
            Some(grid.vertex_at(graph, to.0, to.1)?),
        );
        assert!(search.start(graph));
        assert_eq!(search.run(graph, &mut UnlimitedBudget), TraversalState::Finished);
        Ok(search)
    }

    #[test]
    fn test_corner_to_corner_on_open_grid() -> Result<()> {
        let grid = GridGraphBuilder::new(5, 5);
        let graph = grid.build()?;
        let search = run(&grid, &graph, (0, 0), (4, 4), AstarTraversalConfig::default())?;

        assert_eq!(search.outcome(), SearchOutcome::Found);
        let goal = grid.vertex_at(&graph, 4, 4)?;
        assert_eq!(search.cost_to(&graph, goal), Some(8.0));

        let path = search.build_path(&graph)?;
        assert_eq!(path.len() - 1, 8);
        assert!((path.length() - 8.0).abs() < 1e-5);

        let positions = path.positions();
        assert_eq!(positions.first(), Some(&grid.position(0, 0)));
        assert_eq!(positions.last(), Some(&grid.position(4, 4)));
        Ok(())
    }

    #[test]
    fn test_removing_the_only_route_makes_goal_unreachable() -> Result<()> {
        // (4, 4) is reachable only through (4, 3)
        let grid = GridGraphBuilder::new(5, 5).without_edge((3, 4), (4, 4));
        let graph = grid.build()?;
        let search = run(&grid, &graph, (0, 0), (4, 4), AstarTraversalConfig::default())?;
        assert_eq!(search.outcome(), SearchOutcome::Found);
        assert_eq!(search.cost_to(&graph, grid.vertex_at(&graph, 4, 4)?), Some(8.0));

        let grid = grid.without_edge((4, 3), (4, 4));
        let graph = grid.build()?;
        let search = run(&grid, &graph, (0, 0), (4, 4), AstarTraversalConfig::default())?;
        assert_eq!(search.outcome(), SearchOutcome::Unreachable);
        assert!(search.context().is_open_list_empty());
        assert!(search.build_path(&graph).is_err());
        Ok(())
    }

    #[test]
    fn test_max_cost_bounds_closed_vertices() -> Result<()> {
        let grid = GridGraphBuilder::new(5, 5);
        let graph = grid.build()?;
        let search = run(
            &grid,
            &graph,
            (0, 0),
            (4, 4),
            AstarTraversalConfig::default().with_max_cost(3.0),
        )?;

        assert_eq!(search.outcome(), SearchOutcome::BoundExceeded);
        assert!(search.context().is_open_list_empty());

        let mut closed = 0;
        for y in 0..5 {
            for x in 0..5 {
                let vertex = grid.vertex_at(&graph, x, y)?;
                let id = graph.astar_id(vertex).ok_or(Error::Graph("no id".into()))?;
                if search.context().status(id) == VertexStatus::Closed {
                    closed += 1;
                    assert!(search.context().cost_from_start(id) <= 3.0);
                    assert!(x + y <= 3);
                }
            }
        }
        // Every vertex within 3 steps of the corner
        assert_eq!(closed, 10);
        Ok(())
    }

    #[test]
    fn test_max_distance_limits_exploration() -> Result<()> {
        let grid = GridGraphBuilder::new(7, 7);
        let graph = grid.build()?;
        let start = grid.vertex_at(&graph, 0, 0)?;

        let mut search = AstarTraversal::new(AstarTraversalConfig::default().with_max_distance(3.0))?;
        search.set_endpoints(start, Some(grid.vertex_at(&graph, 6, 6)?));
        assert!(search.start(&graph));

        let mut visitor = CountingVisitor::new(graph.vertex_position(start)?);
        let state = search.traverse_vertices(&graph, &mut UnlimitedBudget, &mut visitor);

        assert_eq!(state, TraversalState::Finished);
        assert_eq!(search.outcome(), SearchOutcome::BoundExceeded);
        assert!(visitor.farthest <= 3.0 + 1e-5);
        // Grid points with x² + y² <= 9
        assert_eq!(visitor.vertices, 11);
        assert_eq!(search.core().processed_vertices(), 11);
        Ok(())
    }

    #[test]
    fn test_disconnected_components_terminate() -> Result<()> {
        let grid = GridGraphBuilder::new(6, 2)
            .without_edge((2, 0), (3, 0))
            .without_edge((2, 1), (3, 1));
        let graph = grid.build()?;
        let search = run(&grid, &graph, (0, 0), (5, 1), AstarTraversalConfig::default())?;
        assert_eq!(search.outcome(), SearchOutcome::Unreachable);
        // Every edge leaving the six vertices of the start component
        assert_eq!(search.core().processed_edges(), 14);
        Ok(())
    }

    #[test]
    fn test_equal_cost_paths_prefer_latest_candidate() -> Result<()> {
        let grid = GridGraphBuilder::new(3, 3);
        let graph = grid.build()?;
        let search = run(&grid, &graph, (0, 0), (2, 2), AstarTraversalConfig::default())?;

        let expected = vec![
            grid.position(0, 0),
            grid.position(0, 1),
            grid.position(1, 1),
            grid.position(1, 2),
            grid.position(2, 2),
        ];
        assert_eq!(search.build_path(&graph)?.positions(), expected);

        // Same answer every time
        for _ in 0..3 {
            let again = run(&grid, &graph, (0, 0), (2, 2), AstarTraversalConfig::default())?;
            assert_eq!(again.build_path(&graph)?.positions(), expected);
        }
        Ok(())
    }

    #[test]
    fn test_terrain_costs_steer_around_slow_ground() -> Result<()> {
        let grid = GridGraphBuilder::new(3, 2).with_terrain((1, 0), 2);
        let graph = grid.build()?;
        let constraint: Arc<dyn Constraint> =
            Arc::new(ShortestPathConstraint::new().with_terrain_multiplier(2, 5.0)?);

        let (outcome, path) = find_path(
            &graph,
            grid.vertex_at(&graph, 0, 0)?,
            grid.vertex_at(&graph, 2, 0)?,
            Arc::clone(&constraint),
            Arc::new(EuclideanHeuristic::default()),
            AstarTraversalConfig::default(),
        )?;
        assert_eq!(outcome, SearchOutcome::Found);
        let path = path.ok_or(Error::Pathfinding("no path".into()))?;
        assert_eq!(path.len(), 5);
        assert_eq!(path_cost(&graph, &path, constraint.as_ref())?, Some(4.0));
        assert!(!path.positions().contains(&Vec3::new(1.0, 0.0, 0.0)));
        Ok(())
    }

    #[test]
    fn test_matches_dijkstra_on_random_grids() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let constraint: Arc<dyn Constraint> =
            Arc::new(ShortestPathConstraint::new().with_terrain_multiplier(2, 2.5)?);
        let heuristic: Arc<dyn Heuristic> = Arc::new(EuclideanHeuristic::default());

        for _ in 0..25 {
            let (width, height) = (rng.gen_range(3..9), rng.gen_range(3..9));
            let grid = random_grid(&mut rng, width, height, 0.3);
            let graph = grid.build()?;
            let start = grid.vertex_at(&graph, rng.gen_range(0..width), rng.gen_range(0..height))?;
            let goal = grid.vertex_at(&graph, rng.gen_range(0..width), rng.gen_range(0..height))?;

            let reference = dijkstra(&graph, start, constraint.as_ref())?;
            let (outcome, path) = find_path(
                &graph,
                start,
                goal,
                Arc::clone(&constraint),
                Arc::clone(&heuristic),
                AstarTraversalConfig::default(),
            )?;

            match reference.get(&goal).copied().filter(|d| d.is_finite()) {
                Some(expected) => {
                    assert_eq!(outcome, SearchOutcome::Found);
                    let path = path.ok_or(Error::Pathfinding("missing path".into()))?;
                    let cost = path_cost(&graph, &path, constraint.as_ref())?
                        .ok_or(Error::Pathfinding("path uses a forbidden edge".into()))?;
                    assert!(
                        (cost - expected).abs() < 1e-3,
                        "A* cost {} differs from Dijkstra {}",
                        cost,
                        expected
                    );
                }
                None => {
                    assert_eq!(outcome, SearchOutcome::Unreachable);
                    assert!(path.is_none());
                }
            }
        }
        Ok(())
    }
}
