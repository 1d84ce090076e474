//! CLI utility for navgraph grid generation, searches and agent simulation

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use glam::Vec3;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use navgraph::{
    AgentId, AstarTraversal, AstarTraversalConfig, GraphManager, GraphTraversal, GridGraphBuilder,
    StepBudget, TaskId, TraversalState, TERRAIN_ALL,
};
use navgraph_pathfinder::{
    AgentState, FrameContext, ModifierConfig, ModifierRegistry, NextMove, PathFinder, PathFinderConfig,
};

/// A CLI utility for building navgraph grids and running time-sliced searches on them
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a grid graph and save its cells
    Grid {
        /// Output graph file
        #[clap(long, value_parser)]
        output: PathBuf,

        /// Number of vertices along x
        #[clap(long, default_value = "16")]
        width: u32,

        /// Number of vertices along z
        #[clap(long, default_value = "16")]
        height: u32,

        /// Vertices per cell side; one cell when omitted
        #[clap(long)]
        cell_size: Option<u32>,

        /// Distance between neighbouring vertices
        #[clap(long, default_value = "1.0")]
        spacing: f32,
    },

    /// Find a path with a time-sliced A* search
    FindPath {
        /// Input graph file
        #[clap(long, value_parser)]
        graph: PathBuf,

        /// Start position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        start: Vec3,

        /// End position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        end: Vec3,

        /// Edges processed per frame
        #[clap(long, default_value = "64")]
        budget: u32,

        /// Output path file
        #[clap(long, value_parser)]
        output: Option<PathBuf>,
    },

    /// Simulate one agent following a path to a goal
    Follow {
        /// Input graph file
        #[clap(long, value_parser)]
        graph: PathBuf,

        /// Start position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        start: Vec3,

        /// Goal position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        goal: Vec3,

        /// Work units per task and frame
        #[clap(long, default_value = "64")]
        budget: u32,

        /// Frame duration in seconds
        #[clap(long, default_value = "0.1")]
        dt: f32,

        /// Give up after this many frames
        #[clap(long, default_value = "10000")]
        max_frames: u32,
    },
}

/// Parse a comma-separated vector
fn parse_vector(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').collect();

    if parts.len() != 3 {
        return Err(format!(
            "Vector must have 3 components, got {}",
            parts.len()
        ));
    }

    let x = parts[0].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let y = parts[1].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let z = parts[2].trim().parse::<f32>().map_err(|e| e.to_string())?;

    Ok(Vec3::new(x, y, z))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match args.command {
        Commands::Grid {
            output,
            width,
            height,
            cell_size,
            spacing,
        } => build_grid(&output, width, height, cell_size, spacing),
        Commands::FindPath {
            graph,
            start,
            end,
            budget,
            output,
        } => find_path(&graph, start, end, budget, output.as_deref()),
        Commands::Follow {
            graph,
            start,
            goal,
            budget,
            dt,
            max_frames,
        } => follow(&graph, start, goal, budget, dt, max_frames),
    }
}

/// Build a grid graph and save it
fn build_grid(output: &Path, width: u32, height: u32, cell_size: Option<u32>, spacing: f32) -> Result<()> {
    let mut builder = GridGraphBuilder::new(width, height).with_spacing(spacing);
    if let Some(cell_size) = cell_size {
        builder = builder.with_cell_size(cell_size);
    }

    let graph = builder
        .build()
        .map_err(|e| anyhow!("Failed to build grid: {}", e))?;
    println!(
        "Grid built: {}x{} vertices in {} cells",
        width,
        height,
        graph.cell_count()
    );
    log::info!("{} vertices total", graph.vertex_count());

    graph
        .save_to_binary(output)
        .with_context(|| format!("Failed to save graph to {}", output.display()))?;

    println!("Saved graph to {}", output.display());
    Ok(())
}

/// Load every cell of a graph file
fn load_graph(path: &Path) -> Result<GraphManager> {
    println!("Loading graph from {}...", path.display());

    let graph = GraphManager::load_from_binary(path)
        .with_context(|| format!("Failed to load graph from {}", path.display()))?;

    println!(
        "Graph loaded: {} cells, {} vertices",
        graph.cell_count(),
        graph.vertex_count()
    );
    Ok(graph)
}

/// Find a path between the vertices nearest to two positions
fn find_path(graph_path: &Path, start: Vec3, end: Vec3, budget: u32, output: Option<&Path>) -> Result<()> {
    let graph = load_graph(graph_path)?;
    let search_radius = 5.0;

    let start_ref = graph
        .nearest_vertex(start, search_radius, TERRAIN_ALL)
        .ok_or_else(|| anyhow!("No vertex near start position {:?}", start))?;
    let end_ref = graph
        .nearest_vertex(end, search_radius, TERRAIN_ALL)
        .ok_or_else(|| anyhow!("No vertex near end position {:?}", end))?;

    println!("Finding path from {} to {}...", start_ref, end_ref);

    let task = TaskId(0);
    let mut search = AstarTraversal::new(AstarTraversalConfig::default().with_task(task))?;
    search.set_endpoints(start_ref, Some(end_ref));
    if !search.start(&graph) {
        return Err(anyhow!("Failed to start the search"));
    }

    let mut budget = StepBudget::new(budget.max(1));
    let mut frames = 1;
    while search.run(&graph, &mut budget) == TraversalState::Paused {
        budget.new_frame();
        frames += 1;
    }

    let outcome = search.outcome();
    println!("Search finished with {:?} after {} frames", outcome, frames);
    if !outcome.is_found() {
        return Err(anyhow!("No path found: {}", outcome.status()));
    }

    let path = search.build_path(&graph)?;
    println!("Found path with {} nodes, length {:.2}", path.len(), path.length());

    if let Some(output_path) = output {
        println!("Saving path to {}...", output_path.display());

        let mut file = File::create(output_path)
            .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;

        writeln!(file, "# Path from {:?} to {:?}", start, end)?;
        writeln!(file, "# {} nodes", path.len())?;

        for position in path.positions() {
            writeln!(file, "{},{},{}", position.x, position.y, position.z)?;
        }
    } else {
        println!("Path:");
        for (i, position) in path.positions().iter().enumerate() {
            println!("{}: {},{},{}", i, position.x, position.y, position.z);
        }
    }

    Ok(())
}

/// Run one agent with the default modifiers until it arrives
fn follow(graph_path: &Path, start: Vec3, goal: Vec3, budget: u32, dt: f32, max_frames: u32) -> Result<()> {
    let graph = load_graph(graph_path)?;

    let modifiers = ModifierRegistry::with_defaults()?.build(&ModifierConfig::default())?;
    let mut finder = PathFinder::new(PathFinderConfig::default(), modifiers)?;
    let mut agent = AgentState::new(AgentId(1), start);
    agent.validate()?;

    let mut budget = StepBudget::new(budget.max(1));
    let mut now = 0.0;

    for frame in 0..max_frames {
        budget.new_frame();
        let mut context = FrameContext::new(&graph, &mut budget, now, dt);
        let next = finder.find_next_move(&mut context, &agent, goal)?;
        now += dt;

        match next {
            NextMove::Arrived => {
                println!(
                    "Arrived at {:?} after {} frames ({:.2}s, {} path requests)",
                    agent.position,
                    frame,
                    now,
                    finder.replans()
                );
                return Ok(());
            }
            NextMove::Move(action) => {
                agent.apply(&action, dt);
                log::debug!("frame {}: at {:?}, speed {:.2}", frame, agent.position, action.speed);
            }
            NextMove::Waiting => log::trace!("frame {}: waiting ({:?})", frame, finder.path_status()),
            NextMove::NoPath => log::info!("frame {}: no path ({:?})", frame, finder.last_error()),
        }
    }

    Err(anyhow!(
        "Agent did not arrive within {} frames, last position {:?}",
        max_frames,
        agent.position
    ))
}
