//! 控制流节点：分类、排序、聚合（错误恢复见 core::recovery）

pub mod aggregator;
pub mod classifier;
pub mod orderer;

pub use aggregator::{presentation_order, Aggregator};
pub use classifier::Classifier;
pub use orderer::Orderer;
