//! Continuous distance LOD: quadtree, selection and draw list

pub mod node;
pub mod quadtree;
pub mod selection;
pub mod draw_list;
pub mod gridmesh;

pub use node::{NodeId, Quadrant, QuadrantMask, SelectResult, Node};
pub use quadtree::{Quadtree, expected_node_count};
pub use selection::{SelectedNode, SelectionContext};
pub use draw_list::{DrawCommand, DrawList, NodeDrawParams, RenderStats};
pub use gridmesh::{GridMesh, GridVertex};
