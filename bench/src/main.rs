use std::collections::VecDeque;
use std::time::Instant;

use ber_graph_core::{codec, Edge, Ref, Store, StoreConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let no_shrink = args.iter().any(|a| a == "--no-shrink");
    let positional: Vec<&str> = args
        .iter()
        .skip(1)
        .map(|s| s.as_str())
        .filter(|s| !s.starts_with("--"))
        .collect();

    if args.iter().any(|a| a == "help" || a == "--help") {
        println!("Usage: ber-graph-bench [mode] [edge_count] [--no-shrink]");
        println!();
        println!("Modes:");
        println!("  all         Run all generators and benchmark each (default)");
        println!("  tree        Branching tree (one relation set per parent)");
        println!("  scalefree   Preferential attachment via edge sampling (hub-and-spoke)");
        println!("  random      Uniform random edges");
        println!("  dla         Diffusion-limited aggregation (organic branching)");
        println!();
        println!("Flags:");
        println!("  --no-shrink Keep container capacity on pop");
        println!();
        println!("Default edge_count: 1000000 (max {})", MAX_EDGE_COUNT);
        println!("Log level: RUST_LOG (default warn)");
        return;
    }

    let mode = positional.first().copied().unwrap_or("all");
    let edge_count = parse_edge_count(positional.get(1).copied());
    let config = StoreConfig {
        shrink_on_remove: !no_shrink,
        ..StoreConfig::default()
    };

    println!("ber-graph-bench");
    println!("===============");
    println!();

    let generators: Vec<(&str, fn(u32) -> Vec<Edge>)> = match mode {
        "tree" => vec![("Branching tree", gen_tree)],
        "scalefree" => vec![("Scale-free (edge sampling)", gen_scale_free)],
        "random" => vec![("Uniform random", gen_random)],
        "dla" => vec![("DLA (organic branching)", gen_dla)],
        "all" => vec![
            ("Branching tree", gen_tree as fn(u32) -> Vec<Edge>),
            ("Scale-free (edge sampling)", gen_scale_free),
            ("Uniform random", gen_random),
            ("DLA (organic branching)", gen_dla),
        ],
        _ => {
            eprintln!("Unknown mode: {}. Use --help for options.", mode);
            return;
        }
    };

    for (name, generator) in generators {
        run_benchmark(name, generator, edge_count, &config);
    }
}

/// Generators number at most edge_count + a few nodes, and every node index
/// must fit above FIRST_ENTITY in a Ref.
const MAX_EDGE_COUNT: u32 = 1 << 30;

fn parse_edge_count(arg: Option<&str>) -> u32 {
    let requested = arg.and_then(|s| s.parse::<u32>().ok()).unwrap_or(1_000_000);
    if requested > MAX_EDGE_COUNT {
        eprintln!("edge_count {} clamped to {}", requested, MAX_EDGE_COUNT);
    }
    requested.min(MAX_EDGE_COUNT)
}

fn millis(t: Instant) -> f64 {
    t.elapsed().as_secs_f64() * 1000.0
}

fn run_benchmark(name: &str, generator: fn(u32) -> Vec<Edge>, edge_count: u32, config: &StoreConfig) {
    println!("--- {} ---", name);
    println!("Target: {} edges", edge_count);

    let t = Instant::now();
    let edges = generator(edge_count);
    println!("Generated {} edges in {:.1}ms", edges.len(), millis(t));

    // Bulk load inside one transaction
    let mut store = Store::with_config(config);
    let t = Instant::now();
    let inserted = store.put_all(edges.iter().copied());
    let load_ms = millis(t);
    let t = Instant::now();
    let update = store.commit();
    let commit_ms = millis(t);
    let state = store.state();
    println!(
        "Loaded {} edges ({} duplicates) in {:.1}ms, commit {:.3}ms, {} sources, {} targets",
        inserted,
        edges.len() - inserted,
        load_ms,
        commit_ms,
        state.source_count(),
        state.target_count()
    );

    let t = Instant::now();
    let added = update.put_edges().edge_count();
    println!("Initial diff: {} put edges in {:.1}ms", added, millis(t));

    // Lookups from both directions
    println!();
    println!("{:>14} {:>12} {:>12} {:>10}", "lookup", "probes", "hits", "time");
    println!("{:->14} {:->12} {:->12} {:->10}", "", "", "", "");

    let t = Instant::now();
    let hits = edges.iter().filter(|e| state.contains(e.source, e.relation, e.target)).count();
    println!("{:>14} {:>12} {:>12} {:>8.1}ms", "contains", edges.len(), hits, millis(t));

    let t = Instant::now();
    let fanout: usize = edges.iter().map(|e| state.target_ref_count(e.source, e.relation)).sum();
    println!("{:>14} {:>12} {:>12} {:>8.1}ms", "targets(s,r)", edges.len(), fanout, millis(t));

    let t = Instant::now();
    let fanin: usize = edges.iter().map(|e| state.source_ref_count(e.target, e.relation)).sum();
    println!("{:>14} {:>12} {:>12} {:>8.1}ms", "sources(t,r)", edges.len(), fanin, millis(t));

    let t = Instant::now();
    let walked = state.iter().count();
    println!("{:>14} {:>12} {:>12} {:>8.1}ms", "enumerate", walked, walked, millis(t));

    // Small transaction on top of a large baseline: only touched paths fork
    println!();
    let sample: Vec<Edge> = edges.iter().step_by(100).copied().collect();
    let t = Instant::now();
    let popped = store.pop_all(sample.iter().copied());
    let fresh = store.new_next_ref();
    store.put(fresh, 1, fresh);
    let tx_ms = millis(t);
    let t = Instant::now();
    let update = store.rollback();
    let rollback_ms = millis(t);
    let t = Instant::now();
    let restored = update.put_edges().edge_count();
    let discarded = update.pop_edges().edge_count();
    println!(
        "Transaction: popped {} + put 1 in {:.1}ms, rollback {:.3}ms, diff {}/{} in {:.1}ms",
        popped,
        tx_ms,
        rollback_ms,
        restored,
        discarded,
        millis(t)
    );

    // Codec round trip
    let t = Instant::now();
    let data = codec::persist_state(store.state());
    let persist_ms = millis(t);
    let t = Instant::now();
    match codec::restore_state(&data) {
        Ok(restored) => println!(
            "Codec: {} values (~{:.1}MB) persisted in {:.1}ms, restored {} edges in {:.1}ms",
            data.len(),
            (data.len() * 4) as f64 / 1_048_576.0,
            persist_ms,
            restored.edge_count(),
            millis(t)
        ),
        Err(err) => println!("Codec: restore failed: {}", err),
    }
    println!();
}

// ---------------------------------------------------------------------------
// Generators: O(edges), single-threaded, deterministic
// ---------------------------------------------------------------------------

/// Simple LCG for deterministic, fast pseudo-random numbers.
struct FastRng(u64);

impl FastRng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next(&mut self, max: u32) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((self.0 >> 33) % max as u64) as u32
    }
}

/// Relation refs 1..=5 stand in for a handful of edge labels; entity refs
/// start above them.
const RELATIONS: Ref = 5;
const FIRST_ENTITY: Ref = 100;

fn entity(i: u32) -> Ref {
    Ref::try_from(i)
        .ok()
        .and_then(|i| FIRST_ENTITY.checked_add(i))
        .unwrap_or_else(|| panic!("node index {i} does not fit a reference"))
}

fn relation(rng: &mut FastRng) -> Ref {
    1 + rng.next(RELATIONS as u32) as Ref
}

/// Branching tree: each parent links its children through one relation, so
/// every (parent, relation) holds a multi-target set.
fn gen_tree(edge_count: u32) -> Vec<Edge> {
    let mut edges = Vec::with_capacity(edge_count as usize);
    let branching = 4u32;
    let mut rng = FastRng::new(42);
    let mut parent = 0u32;
    let mut child = 1u32;
    while (edges.len() as u32) < edge_count {
        let rel = relation(&mut rng);
        for _ in 0..branching {
            if edges.len() as u32 >= edge_count {
                break;
            }
            edges.push(Edge::new(entity(parent), rel, entity(child)));
            child += 1;
        }
        parent += 1;
    }
    edges
}

/// Scale-free via edge-list sampling: a new node attaches to the endpoint of
/// a random existing edge, so well-connected nodes are picked more often.
fn gen_scale_free(edge_count: u32) -> Vec<Edge> {
    let edges_per_node = 10u32;
    let mut edges = Vec::with_capacity(edge_count as usize);
    let mut endpoints: Vec<u32> = Vec::with_capacity(edge_count as usize * 2);
    let mut rng = FastRng::new(12345);

    // Seed: small clique
    let seed = 5u32;
    for i in 0..seed {
        for j in (i + 1)..seed {
            edges.push(Edge::new(entity(i), relation(&mut rng), entity(j)));
            endpoints.push(i);
            endpoints.push(j);
        }
    }

    let mut new_node = seed;
    while (edges.len() as u32) < edge_count {
        for _ in 0..edges_per_node {
            let target = endpoints[rng.next(endpoints.len() as u32) as usize];
            if target != new_node {
                edges.push(Edge::new(entity(new_node), relation(&mut rng), entity(target)));
                endpoints.push(new_node);
                endpoints.push(target);
            }
        }
        new_node += 1;
    }
    edges.truncate(edge_count as usize);
    edges
}

/// Uniform random edges over edge_count / 10 nodes.
fn gen_random(edge_count: u32) -> Vec<Edge> {
    let node_count = (edge_count / 10).max(2);
    let mut rng = FastRng::new(54321);
    (0..edge_count)
        .map(|_| {
            let from = rng.next(node_count);
            let to = rng.next(node_count);
            Edge::new(entity(from), relation(&mut rng), entity(to))
        })
        .collect()
}

/// DLA (Diffusion-Limited Aggregation): each new node attaches to a recent
/// "surface" node, with occasional long-range shortcuts.
fn gen_dla(edge_count: u32) -> Vec<Edge> {
    let mut edges = Vec::with_capacity(edge_count as usize);
    let mut rng = FastRng::new(77777);

    // VecDeque for O(1) pop_front when evicting oldest surface nodes.
    let surface_max = 10000usize;
    let mut surface: VecDeque<u32> = VecDeque::with_capacity(surface_max + 1);
    surface.push_back(0);

    let mut new_node = 1u32;
    while (edges.len() as u32) < edge_count {
        let attach_to = surface[rng.next(surface.len() as u32) as usize];
        edges.push(Edge::new(entity(new_node), relation(&mut rng), entity(attach_to)));

        // 10% chance of a second connection (creates loops / shortcuts)
        if rng.next(10) == 0 && new_node > 1 {
            let other = rng.next(new_node);
            if other != attach_to {
                edges.push(Edge::new(entity(new_node), relation(&mut rng), entity(other)));
            }
        }

        surface.push_back(new_node);
        if surface.len() > surface_max {
            surface.pop_front();
        }
        new_node += 1;
    }
    edges.truncate(edge_count as usize);
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_count_is_clamped() {
        assert_eq!(parse_edge_count(None), 1_000_000);
        assert_eq!(parse_edge_count(Some("junk")), 1_000_000);
        assert_eq!(parse_edge_count(Some("5000")), 5000);
        assert_eq!(parse_edge_count(Some("4294967295")), MAX_EDGE_COUNT);
    }

    #[test]
    fn test_largest_node_index_fits() {
        // scale-free numbers nodes up to edge_count + its seed clique
        assert!(entity(MAX_EDGE_COUNT + 5) > FIRST_ENTITY);
        assert_eq!(entity(0), FIRST_ENTITY);
    }

    #[test]
    fn test_generators_are_deterministic_and_valid() {
        let generators: [fn(u32) -> Vec<Edge>; 4] = [gen_tree, gen_scale_free, gen_random, gen_dla];
        for generator in generators {
            let a = generator(500);
            assert_eq!(a.len(), 500);
            assert!(a.iter().all(Edge::is_valid));
            assert_eq!(a, generator(500));
        }
    }
}
