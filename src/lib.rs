pub mod array_allocator;
pub mod concurrent_map;
pub mod error;
pub mod euler_tour_tree;
pub mod random;
pub mod skip_list;

pub use error::{Error, Result};
pub use euler_tour_tree::{EulerTourTree, ForestConfig};
pub use skip_list::augmented::AugmentedSkipList;
pub use skip_list::SkipList;
