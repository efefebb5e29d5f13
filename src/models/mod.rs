//! # 数据模型模块
//!
//! 定义统一的原子结构和计算结果数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`、`calculator/` 和 `commands/` 使用
//! - 子模块: structure, calculation, elements

pub mod calculation;
pub mod elements;
pub mod structure;

pub use calculation::{
    CalculationResult, KPoint, KPointEigenvalues, ProcessOutcome, Property, PropertyValue,
    HTR_TO_EV,
};
pub use structure::{Atom, Lattice, Structure, BOHR_TO_ANGSTROM};
