//! Properties of built trees over random box sets.

mod common;

use common::random_boxes;
use lumen_bvh::{BuildParams, Bvh, Heuristic, Node};
use lumen_math::{Aabb, NUM_AXES};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Original indices of the primitives below `index`.
fn subtree_members(bvh: &Bvh, order: &[u32], index: usize, out: &mut Vec<u32>) {
    let node: &Node = &bvh.nodes()[index];
    if node.is_leaf() {
        out.extend(node.leaf_range().map(|slot| order[slot as usize]));
    } else {
        let first = node.child_index() as usize;
        subtree_members(bvh, order, first, out);
        subtree_members(bvh, order, first + 1, out);
    }
}

fn union_of(boxes: &[Aabb], members: &[u32]) -> Aabb {
    members
        .iter()
        .fold(Aabb::empty(), |acc, &i| Aabb::union(&acc, &boxes[i as usize]))
}

/// Cost of splitting `members` at the median of their centers on `axis`.
fn median_split_cost(heuristic: Heuristic, boxes: &[Aabb], members: &[u32], axis: usize) -> f32 {
    let mut sorted = members.to_vec();
    sorted.sort_by(|&a, &b| {
        let ca = boxes[a as usize].center()[axis];
        let cb = boxes[b as usize].center()[axis];
        ca.total_cmp(&cb).then(a.cmp(&b))
    });
    let (left, right) = sorted.split_at(sorted.len() / 2);
    heuristic.split_cost(&union_of(boxes, left), left.len(), &union_of(boxes, right), right.len())
}

fn check_split_costs(bvh: &Bvh, order: &[u32], boxes: &[Aabb], heuristic: Heuristic) {
    for node in bvh.nodes().iter().filter(|n| !n.is_leaf()) {
        let first = node.child_index() as usize;
        let mut left = Vec::new();
        let mut right = Vec::new();
        subtree_members(bvh, order, first, &mut left);
        subtree_members(bvh, order, first + 1, &mut right);

        let chosen = heuristic.split_cost(
            &bvh.nodes()[first].bounding_box(),
            left.len(),
            &bvh.nodes()[first + 1].bounding_box(),
            right.len(),
        );

        let mut all = left;
        all.extend(right);
        for axis in 0..NUM_AXES {
            let median = median_split_cost(heuristic, boxes, &all, axis);
            assert!(
                chosen <= median * (1.0 + 1e-5),
                "split cost {chosen} worse than median split {median} on axis {axis}"
            );
        }
    }
}

#[test]
fn test_sah_split_not_worse_than_median() {
    let mut rng = StdRng::seed_from_u64(7);
    for n in [5, 33, 200, 1000] {
        let boxes = random_boxes(&mut rng, n);
        let (bvh, order) = Bvh::build(&boxes, &BuildParams::default()).unwrap();
        check_split_costs(&bvh, &order, &boxes, Heuristic::SurfaceArea);
    }
}

#[test]
fn test_volume_split_not_worse_than_median() {
    let mut rng = StdRng::seed_from_u64(8);
    let boxes = random_boxes(&mut rng, 300);
    let params = BuildParams::with_heuristic(Heuristic::Volume);
    let (bvh, order) = Bvh::build(&boxes, &params).unwrap();
    check_split_costs(&bvh, &order, &boxes, Heuristic::Volume);
}

#[test]
fn test_leaf_coverage_random() {
    let mut rng = StdRng::seed_from_u64(11);
    for n in [1, 2, 3, 10, 511, 2048] {
        let boxes = random_boxes(&mut rng, n);
        let (bvh, order) = Bvh::build(&boxes, &BuildParams::default()).unwrap();

        let mut covered = vec![0u32; n];
        for node in bvh.nodes().iter().filter(|n| n.is_leaf()) {
            for slot in node.leaf_range() {
                covered[slot as usize] += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1), "leaf ranges overlap or leave gaps");

        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..n as u32).collect::<Vec<_>>());
        assert!(bvh.num_nodes() <= 2 * n - 1);
        bvh.validate(Some(n as u32)).unwrap();
    }
}

#[test]
fn test_rebuild_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(3);
    let boxes = random_boxes(&mut rng, 6000);

    let sequential = BuildParams {
        parallel_threshold: usize::MAX,
        ..BuildParams::default()
    };
    let parallel = BuildParams {
        parallel_threshold: 32,
        ..BuildParams::default()
    };

    let (a, order_a) = Bvh::build(&boxes, &parallel).unwrap();
    let (b, order_b) = Bvh::build(&boxes, &parallel).unwrap();
    let (c, order_c) = Bvh::build(&boxes, &sequential).unwrap();

    assert_eq!(a, b);
    assert_eq!(order_a, order_b);
    assert_eq!(a, c);
    assert_eq!(order_a, order_c);
}

#[test]
fn test_stats_match_tree() {
    let mut rng = StdRng::seed_from_u64(5);
    let boxes = random_boxes(&mut rng, 500);
    let (bvh, _) = Bvh::build(&boxes, &BuildParams::default()).unwrap();

    let stats = bvh.calculate_stats();
    let leaves: u32 = stats
        .leaves_count_histogram
        .iter()
        .enumerate()
        .map(|(count, &nodes)| count as u32 * nodes)
        .sum();
    assert_eq!(leaves, 500);
    assert!(stats.max_depth as usize <= lumen_bvh::MAX_DEPTH);
    assert!(stats.total_nodes_area >= bvh.bounding_box().surface_area() as f64);
}

#[test]
fn test_cache_file_round_trip() {
    let mut rng = StdRng::seed_from_u64(9);
    let boxes = random_boxes(&mut rng, 400);
    let (bvh, _) = Bvh::build(&boxes, &BuildParams::default()).unwrap();

    let path = std::env::temp_dir().join(format!("lumen-bvh-test-{}.lbvh", std::process::id()));
    bvh.save_to_file(&path).unwrap();
    let loaded = Bvh::load_from_file(&path, Some(400));
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.unwrap(), bvh);
}
