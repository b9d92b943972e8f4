//! Per-thread traversal state and counters.

/// Intersection counters gathered during traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RayCounters {
    /// Rays (or packet rays) traced through a scene.
    pub num_rays: u64,
    /// Shadow rays traced through a scene.
    pub num_shadow_rays: u64,
    /// Ray-box tests, counting every lane of a packet group.
    pub num_ray_box_tests: u64,
    /// Ray-box tests that passed.
    pub num_passed_ray_box_tests: u64,
    /// Ray-primitive tests.
    pub num_ray_object_tests: u64,
    /// Ray-primitive tests that produced a closer hit.
    pub num_passed_ray_object_tests: u64,
    /// Lanes moved between packet groups by reordering.
    pub num_reordered_lanes: u64,
}

impl RayCounters {
    /// Zero all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Add `other` to these counters.
    pub fn append(&mut self, other: &RayCounters) {
        self.num_rays += other.num_rays;
        self.num_shadow_rays += other.num_shadow_rays;
        self.num_ray_box_tests += other.num_ray_box_tests;
        self.num_passed_ray_box_tests += other.num_passed_ray_box_tests;
        self.num_ray_object_tests += other.num_ray_object_tests;
        self.num_passed_ray_object_tests += other.num_passed_ray_object_tests;
        self.num_reordered_lanes += other.num_reordered_lanes;
    }
}

/// Scratch state owned by one rendering thread.
///
/// Never shared between threads; every worker keeps its own.
#[derive(Debug, Clone, Default)]
pub struct RenderingContext {
    /// Counters of the current scene query, reset when a query starts.
    pub local_counters: RayCounters,
    /// Counters accumulated over all queries.
    pub counters: RayCounters,
}

impl RenderingContext {
    /// A context with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new query: clear the local counters.
    pub fn begin_query(&mut self) {
        self.local_counters.reset();
    }

    /// Finish a query: fold the local counters into the totals.
    pub fn end_query(&mut self) {
        let local = self.local_counters;
        self.counters.append(&local);
    }
}
