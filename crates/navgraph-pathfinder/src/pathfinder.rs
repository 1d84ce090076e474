//! Per-agent path planning and following
//!
//! A [`PathFinder`] owns one agent's search, path and taboo edges. Every frame
//! [`PathFinder::find_next_move`] runs the modifier pipeline:
//!
//! 1. refine the goal and replan when it moved;
//! 2. stop once the goal is reached;
//! 3. replan when the path refers to cells that were streamed out;
//! 4. check for accidents on a throttled period, marking the blocked edge taboo;
//! 5. resolve a new request (direct way or time-sliced A*) and step the search;
//! 6. follow the path: consume reached nodes, select a candidate, compute the
//!    target point and turn it into an [`Action`](crate::Action).

use std::sync::Arc;

use navgraph::{
    AstarTraversal, AstarTraversalConfig, Constraint, GraphManager, GraphTraversal, Path, PathNode,
    PathNodeId, SearchOutcome, Status, TaskId, TraversalState, VertexRef,
};
use navgraph_common::{distance, Error, Result, Vec3};

use super::agent::{AgentState, FrameContext, NextMove};
use super::edge_status::{TabooEdgeConstraint, TabooEdges};
use super::modifiers::Modifiers;

/// Goals closer than this to the last path node are not appended to the path
const GOAL_MERGE_DISTANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PathFinderConfig {
    /// Search settings; the task is replaced by `astar_task`
    pub astar: AstarTraversalConfig,
    /// Task the A* search is time-sliced under
    pub astar_task: TaskId,
    /// Task consulted for candidate selection and accident checks
    pub follow_task: TaskId,
    /// Seconds to wait after a failed search before trying again
    pub astar_new_attempt_period: f32,
    /// Seconds between two accident checks
    pub accident_check_period: f32,
    /// Ceiling of the check period when it keeps doubling
    pub max_accident_check_period: f32,
}

impl Default for PathFinderConfig {
    fn default() -> Self {
        Self {
            astar: AstarTraversalConfig::default(),
            astar_task: TaskId(0),
            follow_task: TaskId(1),
            astar_new_attempt_period: 1.0,
            accident_check_period: 0.5,
            max_accident_check_period: 4.0,
        }
    }
}

impl PathFinderConfig {
    pub fn with_astar(mut self, astar: AstarTraversalConfig) -> Self {
        self.astar = astar;
        self
    }

    pub fn with_tasks(mut self, astar_task: TaskId, follow_task: TaskId) -> Self {
        self.astar_task = astar_task;
        self.follow_task = follow_task;
        self
    }

    pub fn with_astar_new_attempt_period(mut self, period: f32) -> Self {
        self.astar_new_attempt_period = period;
        self
    }

    pub fn with_accident_check_period(mut self, period: f32) -> Self {
        self.accident_check_period = period;
        self
    }

    pub fn with_max_accident_check_period(mut self, period: f32) -> Self {
        self.max_accident_check_period = period;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.astar.validate()?;
        if !self.astar_new_attempt_period.is_finite() || self.astar_new_attempt_period < 0.0 {
            return Err(Error::Config(format!(
                "astar_new_attempt_period must not be negative, got {}",
                self.astar_new_attempt_period
            )));
        }
        if !self.accident_check_period.is_finite() || self.accident_check_period <= 0.0 {
            return Err(Error::Config(format!(
                "accident_check_period must be positive, got {}",
                self.accident_check_period
            )));
        }
        if self.max_accident_check_period.is_nan()
            || self.max_accident_check_period < self.accident_check_period
        {
            return Err(Error::Config(format!(
                "max_accident_check_period must be at least {}, got {}",
                self.accident_check_period, self.max_accident_check_period
            )));
        }
        Ok(())
    }
}

/// Where the agent's path stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStatus {
    /// No path; one is requested on the next frame
    None,
    /// A search is running
    Searching,
    /// A path is being followed
    Following,
    Arrived,
    /// The last search failed; retried after the attempt period
    Failed,
}

/// Last recoverable failure of a [`PathFinder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathFinderError {
    /// No vertex near the agent could be reached
    StartNotFound,
    /// No vertex near the goal could reach it
    DestinationNotFound,
    /// The search ended without a path
    SearchFailed(SearchOutcome),
    NoTargetPoint,
    GotoFailed,
}

impl PathFinderError {
    pub fn status(&self) -> Status {
        match self {
            PathFinderError::StartNotFound | PathFinderError::DestinationNotFound => Status::NotFound,
            PathFinderError::SearchFailed(outcome) => outcome.status(),
            PathFinderError::NoTargetPoint | PathFinderError::GotoFailed => Status::Failure,
        }
    }
}

impl std::fmt::Display for PathFinderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathFinderError::StartNotFound => write!(f, "no reachable start vertex"),
            PathFinderError::DestinationNotFound => write!(f, "no destination vertex reaching the goal"),
            PathFinderError::SearchFailed(outcome) => write!(f, "search ended with {:?}", outcome),
            PathFinderError::NoTargetPoint => write!(f, "no target point for the current path node"),
            PathFinderError::GotoFailed => write!(f, "goto could not produce an action"),
        }
    }
}

/// Drives one agent along paths computed over a [`GraphManager`]
pub struct PathFinder {
    config: PathFinderConfig,
    modifiers: Modifiers,
    search: AstarTraversal,
    path: Path,
    current: Option<PathNodeId>,
    goal: Option<Vec3>,
    status: PathStatus,
    replan: bool,
    replans: u32,
    last_error: Option<PathFinderError>,
    last_failure: Option<f32>,
    taboo: TabooEdges,
    accident_period: f32,
    next_accident_check: f32,
}

impl std::fmt::Debug for PathFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathFinder")
            .field("status", &self.status)
            .field("goal", &self.goal)
            .field("path_len", &self.path.len())
            .field("last_error", &self.last_error)
            .field("taboo_edges", &self.taboo.len())
            .finish()
    }
}

impl PathFinder {
    pub fn new(config: PathFinderConfig, modifiers: Modifiers) -> Result<Self> {
        config.validate()?;
        let astar = config.astar.clone().with_task(config.astar_task);
        let search = AstarTraversal::new(astar)?.with_heuristic(Arc::clone(&modifiers.heuristic));

        Ok(Self {
            accident_period: config.accident_check_period,
            config,
            modifiers,
            search,
            path: Path::new(),
            current: None,
            goal: None,
            status: PathStatus::None,
            replan: false,
            replans: 0,
            last_error: None,
            last_failure: None,
            taboo: TabooEdges::new(),
            next_accident_check: 0.0,
        })
    }

    pub fn config(&self) -> &PathFinderConfig {
        &self.config
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Node the agent is heading for
    pub fn current_node(&self) -> Option<PathNodeId> {
        self.current
    }

    pub fn path_status(&self) -> PathStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<PathFinderError> {
        self.last_error
    }

    /// Goal of the current request, after refinement
    pub fn goal(&self) -> Option<Vec3> {
        self.goal
    }

    pub fn search(&self) -> &AstarTraversal {
        &self.search
    }

    pub fn taboo_edges(&self) -> &TabooEdges {
        &self.taboo
    }

    /// Path requests issued so far
    pub fn replans(&self) -> u32 {
        self.replans
    }

    /// Seconds until the next accident check, doubled while the follow task starves
    pub fn accident_check_period(&self) -> f32 {
        self.accident_period
    }

    /// Computes what the agent should do this frame
    ///
    /// Returns an error only when a path is being followed but no target point
    /// or action could be derived; the path is kept and the next frame retries.
    pub fn find_next_move(
        &mut self,
        frame: &mut FrameContext<'_>,
        agent: &AgentState,
        goal: Vec3,
    ) -> Result<NextMove> {
        let graph = frame.graph;
        let goal = self.update_goal(graph, agent, goal);

        if self.modifiers.detect_goal_reached.goal_reached(agent, goal) {
            if self.status != PathStatus::Arrived {
                log::debug!("Agent {:?} reached its goal", agent.id);
            }
            self.clear_path();
            self.replan = false;
            self.status = PathStatus::Arrived;
            return Ok(NextMove::Arrived);
        }

        if self.status == PathStatus::Following && self.path_is_stale(graph) {
            log::debug!("Path of agent {:?} left the loaded cells, replanning", agent.id);
            self.request_replan();
        }

        self.check_accident(frame, agent);

        if self.needs_request(frame.now) {
            if let Some(early) = self.request_path(frame, agent, goal) {
                return Ok(early);
            }
        } else if self.status == PathStatus::Failed {
            return Ok(NextMove::NoPath);
        }

        if self.status == PathStatus::Searching {
            if let Some(early) = self.step_search(frame, goal)? {
                return Ok(early);
            }
        }

        if self.status != PathStatus::Following {
            return Ok(NextMove::Waiting);
        }
        self.follow(frame, agent)
    }

    /// Replaces the current path; following starts at its first node
    pub fn inject_path(&mut self, path: Path) {
        self.clear_path();
        self.current = path.first();
        self.path = path;
        self.replan = false;
        self.last_error = None;
        self.status = if self.current.is_some() {
            PathStatus::Following
        } else {
            PathStatus::None
        };
    }

    /// Reports the status of the directed edge `from -> to`
    ///
    /// Blocking an edge of the remaining path triggers a replan. Returns true
    /// if the recorded status changed.
    pub fn set_edge_status(&mut self, from: VertexRef, to: VertexRef, passable: bool, now: f32) -> bool {
        let changed = self.taboo.set_status(from, to, passable, now);
        if changed && !passable && self.path_uses_edge(from, to) {
            log::debug!("Edge {} -> {} of the current path was blocked", from, to);
            self.request_replan();
        }
        changed
    }

    /// Forgets the path, the goal and every taboo edge
    pub fn reset(&mut self) {
        self.clear_path();
        self.goal = None;
        self.status = PathStatus::None;
        self.replan = false;
        self.last_error = None;
        self.last_failure = None;
        self.taboo.clear();
        self.accident_period = self.config.accident_check_period;
        self.next_accident_check = 0.0;
    }

    fn update_goal(&mut self, graph: &GraphManager, agent: &AgentState, requested: Vec3) -> Vec3 {
        let refined = self.modifiers.refine_goal.refine_goal(graph, agent, requested);
        match self.goal {
            Some(old) if !self.modifiers.detect_goal_changed.goal_changed(old, refined) => old,
            Some(_) => {
                log::debug!("Goal of agent {:?} changed, replanning", agent.id);
                self.goal = Some(refined);
                self.last_failure = None;
                self.request_replan();
                refined
            }
            None => {
                self.goal = Some(refined);
                refined
            }
        }
    }

    fn request_replan(&mut self) {
        self.replan = true;
    }

    fn needs_request(&self, now: f32) -> bool {
        match self.status {
            PathStatus::None | PathStatus::Arrived => true,
            PathStatus::Failed => self
                .last_failure
                .map_or(true, |t| now - t >= self.config.astar_new_attempt_period),
            PathStatus::Searching | PathStatus::Following => self.replan,
        }
    }

    fn clear_path(&mut self) {
        if matches!(self.search.state(), TraversalState::Running | TraversalState::Paused) {
            self.search.stop();
        }
        self.path.clear();
        self.current = None;
    }

    fn fail(&mut self, now: f32, error: PathFinderError) {
        log::debug!("Path request failed: {}", error);
        self.clear_path();
        self.last_error = Some(error);
        self.last_failure = Some(now);
        self.status = PathStatus::Failed;
    }

    fn path_is_stale(&self, graph: &GraphManager) -> bool {
        self.path
            .iter()
            .filter_map(|node| node.vertex)
            .any(|vertex| !graph.is_valid_vertex_ref(vertex))
    }

    fn path_uses_edge(&self, from: VertexRef, to: VertexRef) -> bool {
        let vertices: Vec<Option<VertexRef>> = self.path.iter().map(|node| node.vertex).collect();
        vertices
            .windows(2)
            .any(|pair| pair[0] == Some(from) && pair[1] == Some(to))
    }

    fn check_accident(&mut self, frame: &mut FrameContext<'_>, agent: &AgentState) {
        if self.status != PathStatus::Following || self.replan || frame.now < self.next_accident_check {
            return;
        }

        if frame.budget.has_time_left(self.config.follow_task) {
            self.accident_period = self.config.accident_check_period;
            if let Some(current) = self.current {
                let accident = self.modifiers.detect_accident.detect_accident(
                    agent,
                    self.modifiers.can_go.as_ref(),
                    &self.path,
                    current,
                );
                if let Some(accident) = accident {
                    if let Some((from, to)) = accident.blocked_edge {
                        self.taboo.set_status(from, to, false, frame.now);
                    }
                    log::debug!(
                        "Accident for agent {:?} on {:?}, replanning",
                        agent.id,
                        accident.blocked_edge
                    );
                    self.request_replan();
                }
            }
        } else {
            self.accident_period = (self.accident_period * 2.0).min(self.config.max_accident_check_period);
        }
        self.next_accident_check = frame.now + self.accident_period;
    }

    /// Starts a new request; returns the move for this frame if it ends here
    fn request_path(&mut self, frame: &mut FrameContext<'_>, agent: &AgentState, goal: Vec3) -> Option<NextMove> {
        let graph = frame.graph;
        self.clear_path();
        self.replan = false;
        self.replans += 1;
        self.status = PathStatus::None;
        let can_go = self.modifiers.can_go.as_ref();

        if let Some(check) = &self.modifiers.check_direct_way {
            if let Some(cost) = check.check_direct_way(agent, can_go, agent.position, goal) {
                log::debug!("Agent {:?} goes straight to its goal (cost {})", agent.id, cost);
                self.path = Path::from_positions([agent.position, goal]);
                self.current = self.path.first();
                self.status = PathStatus::Following;
                self.last_error = None;
                return None;
            }
        }

        let Some(start) = self.modifiers.find_nodes.find_start_node(graph, agent, can_go, agent.position) else {
            self.last_error = Some(PathFinderError::StartNotFound);
            self.request_replan();
            return Some(NextMove::Waiting);
        };
        let Some(dest) = self.modifiers.find_nodes.find_dest_node(graph, agent, can_go, goal) else {
            self.last_error = Some(PathFinderError::DestinationNotFound);
            self.request_replan();
            return Some(NextMove::Waiting);
        };

        self.taboo.purge_stale(graph);
        let blocked = self.taboo.blocked_edges(
            graph,
            agent,
            self.modifiers.edge_status_awareness.as_deref(),
            frame.now,
        );
        let constraint: Arc<dyn Constraint> =
            Arc::new(TabooEdgeConstraint::new(Arc::clone(&self.modifiers.constraint), blocked));

        self.search.set_constraint(constraint);
        self.search.set_heuristic(Arc::clone(&self.modifiers.heuristic));
        self.search.set_agent(Some(agent.id));
        self.search.set_endpoints(start, Some(dest));
        if !self.search.start(graph) {
            self.fail(frame.now, PathFinderError::SearchFailed(SearchOutcome::Invalidated));
            return Some(NextMove::NoPath);
        }

        log::debug!("Agent {:?} searching from {} to {}", agent.id, start, dest);
        self.status = PathStatus::Searching;
        None
    }

    /// Steps the running search; returns the move for this frame unless a path is ready
    fn step_search(&mut self, frame: &mut FrameContext<'_>, goal: Vec3) -> Result<Option<NextMove>> {
        match self.search.run(frame.graph, &mut *frame.budget) {
            TraversalState::Running | TraversalState::Paused => return Ok(Some(NextMove::Waiting)),
            TraversalState::Idle | TraversalState::Finished => {}
        }

        let outcome = self.search.outcome();
        if !outcome.is_found() {
            self.fail(frame.now, PathFinderError::SearchFailed(outcome));
            return Ok(Some(NextMove::NoPath));
        }

        let mut path = self.search.build_path(frame.graph)?;
        let ends_at_goal = path
            .last()
            .and_then(|id| path.get(id))
            .is_some_and(|node| distance(&node.position, &goal) <= GOAL_MERGE_DISTANCE);
        if !ends_at_goal {
            path.push_back(PathNode::at(goal));
        }

        self.current = path.first();
        self.path = path;
        self.status = PathStatus::Following;
        self.last_error = None;
        self.last_failure = None;
        Ok(None)
    }

    /// Erases consumed nodes, keeping the one before `current` as the start of the edge being walked
    fn trim_consumed(&mut self, current: PathNodeId) {
        if let Some(prev) = self.path.prev(current) {
            self.path.erase_before(prev);
        }
    }

    fn follow(&mut self, frame: &mut FrameContext<'_>, agent: &AgentState) -> Result<NextMove> {
        let Some(mut current) = self.current.filter(|id| self.path.contains(*id)) else {
            self.request_replan();
            self.status = PathStatus::None;
            return Ok(NextMove::Waiting);
        };

        while let Some(node) = self.path.get(current) {
            if !self.modifiers.detect_path_node_reached.node_reached(agent, node) {
                break;
            }
            match self.path.next(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        self.trim_consumed(current);

        if frame.budget.has_time_left(self.config.follow_task) {
            current = self.modifiers.select_candidate.select_candidate(
                agent,
                self.modifiers.can_go.as_ref(),
                &self.path,
                current,
            );
            self.trim_consumed(current);
        }
        self.current = Some(current);

        let Some(target) = self.modifiers.compute_target_point.compute_target_point(
            agent,
            self.modifiers.can_go.as_ref(),
            &self.path,
            current,
        ) else {
            self.last_error = Some(PathFinderError::NoTargetPoint);
            return Err(Error::Pathfinding(PathFinderError::NoTargetPoint.to_string()));
        };

        let Some(action) = self.modifiers.goto.goto(agent, target, frame.dt) else {
            self.last_error = Some(PathFinderError::GotoFailed);
            return Err(Error::Pathfinding(PathFinderError::GotoFailed.to_string()));
        };

        if matches!(
            self.last_error,
            Some(PathFinderError::NoTargetPoint | PathFinderError::GotoFailed)
        ) {
            self.last_error = None;
        }
        Ok(NextMove::Move(action))
    }
}
