//! # 计算结果数据模型
//!
//! 存储从 FLEUR out.xml 提取的物理量，以及单次子进程调用的结果。
//!
//! ## 依赖关系
//! - 被 `parsers/outxml.rs` 构造
//! - 被 `calculator/` 与 `commands/` 使用

use crate::error::{FleurError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 1 Hartree 对应的 eV 数
pub const HTR_TO_EV: f64 = 27.211_386_245_988;

/// 可请求的物理量
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    /// 总能 (eV)
    Energy,
    /// 自由能 (eV)
    FreeEnergy,
    /// 每原子受力 (eV/bohr)
    Forces,
    /// 费米能级 (eV)
    FermiLevel,
    /// 每原子 muffin-tin 磁矩 (μB)
    MagneticMoments,
    /// 晶胞总磁矩 (μB)
    CellMagneticMoment,
    /// 每原子电荷：muffin-tin 价电荷与芯电子之和 (e)
    Charges,
}

impl Property {
    pub const ALL: [Property; 7] = [
        Property::Energy,
        Property::FreeEnergy,
        Property::Forces,
        Property::FermiLevel,
        Property::MagneticMoments,
        Property::CellMagneticMoment,
        Property::Charges,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Property::Energy => "energy",
            Property::FreeEnergy => "free_energy",
            Property::Forces => "forces",
            Property::FermiLevel => "fermi_level",
            Property::MagneticMoments => "magmoms",
            Property::CellMagneticMoment => "magmom",
            Property::Charges => "charges",
        }
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Property {
    type Err = FleurError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        Property::ALL
            .into_iter()
            .find(|p| p.name() == key)
            .ok_or_else(|| FleurError::InvalidArgument(format!("unknown property '{}'", s)))
    }
}

/// 物理量取值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Scalar(f64),
    PerAtom(Vec<f64>),
    Vectors(Vec<[f64; 3]>),
}

/// 一次成功计算的完整结果
///
/// 只能通过 [`CalculationResult::from_values`] 构造，保证请求的物理量全部存在。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    values: BTreeMap<Property, PropertyValue>,

    /// 最后一次 SCF 迭代的全局编号
    pub iterations: usize,

    /// 最后一次迭代的电荷密度距离 (me/bohr³)
    pub density_distance: Option<f64>,
}

impl CalculationResult {
    /// 从提取到的值构造结果；缺少任一请求量时失败
    pub fn from_values(
        requested: &BTreeSet<Property>,
        values: BTreeMap<Property, PropertyValue>,
        iterations: usize,
        density_distance: Option<f64>,
    ) -> Result<Self> {
        if let Some(missing) = requested.iter().find(|p| !values.contains_key(p)) {
            return Err(FleurError::IncompleteResult {
                reason: format!("property '{}' not found in output", missing),
            });
        }
        Ok(CalculationResult {
            values,
            iterations,
            density_distance,
        })
    }

    pub fn get(&self, property: Property) -> Option<&PropertyValue> {
        self.values.get(&property)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&Property, &PropertyValue)> {
        self.values.iter()
    }

    pub fn energy(&self) -> Option<f64> {
        self.scalar(Property::Energy)
    }

    pub fn free_energy(&self) -> Option<f64> {
        self.scalar(Property::FreeEnergy)
    }

    pub fn fermi_level(&self) -> Option<f64> {
        self.scalar(Property::FermiLevel)
    }

    pub fn forces(&self) -> Option<&[[f64; 3]]> {
        match self.values.get(&Property::Forces) {
            Some(PropertyValue::Vectors(v)) => Some(v),
            _ => None,
        }
    }

    pub fn magnetic_moments(&self) -> Option<&[f64]> {
        match self.values.get(&Property::MagneticMoments) {
            Some(PropertyValue::PerAtom(v)) => Some(v),
            _ => None,
        }
    }

    pub fn cell_magnetic_moment(&self) -> Option<f64> {
        self.scalar(Property::CellMagneticMoment)
    }

    pub fn charges(&self) -> Option<&[f64]> {
        match self.values.get(&Property::Charges) {
            Some(PropertyValue::PerAtom(v)) => Some(v),
            _ => None,
        }
    }

    fn scalar(&self, property: Property) -> Option<f64> {
        match self.values.get(&property) {
            Some(PropertyValue::Scalar(v)) => Some(*v),
            _ => None,
        }
    }
}

/// 不可约布里渊区中的 k 点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KPoint {
    /// 笛卡尔坐标 (1/bohr)
    pub coordinates: [f64; 3],
    /// 归一化权重，全部 k 点之和为 1
    pub weight: f64,
}

/// 最后一次迭代中某个 k 点、某个自旋通道的本征值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KPointEigenvalues {
    /// 自旋通道，从 0 开始
    pub spin: usize,
    /// k 点序号，从 0 开始，对应 k 点列表中的位置
    pub kpoint: usize,
    /// 本征值 (eV)，按 FLEUR 输出顺序
    pub eigenvalues: Vec<f64>,
}

/// 单次子进程调用的结果
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// 可执行文件
    pub program: String,

    /// 退出码，被信号终止时为 `None`
    pub exit_code: Option<i32>,

    /// 运行时长
    pub duration: Duration,

    /// 工作目录
    pub directory: PathBuf,

    /// stderr 末尾若干行
    pub stderr_tail: String,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_names_round_trip() {
        for p in Property::ALL {
            assert_eq!(p.name().parse::<Property>().unwrap(), p);
        }
        assert!("stress".parse::<Property>().is_err());
        assert_eq!("MAGMOM".parse::<Property>().unwrap(), Property::CellMagneticMoment);
    }

    #[test]
    fn test_result_refuses_partial_values() {
        let requested: BTreeSet<_> = [Property::Energy, Property::Forces].into_iter().collect();
        let mut values = BTreeMap::new();
        values.insert(Property::Energy, PropertyValue::Scalar(-1.0));

        let err = CalculationResult::from_values(&requested, values, 1, None).unwrap_err();
        assert!(matches!(err, FleurError::IncompleteResult { .. }));
    }

    #[test]
    fn test_result_accessors() {
        let requested: BTreeSet<_> = [Property::Energy].into_iter().collect();
        let mut values = BTreeMap::new();
        values.insert(Property::Energy, PropertyValue::Scalar(-2.5));
        values.insert(
            Property::Forces,
            PropertyValue::Vectors(vec![[0.0, 0.0, 0.1]]),
        );

        let result = CalculationResult::from_values(&requested, values, 7, Some(1e-7)).unwrap();
        assert_eq!(result.energy(), Some(-2.5));
        assert_eq!(result.forces().unwrap().len(), 1);
        assert_eq!(result.fermi_level(), None);
        assert_eq!(result.charges(), None);
        assert_eq!(result.iterations, 7);
    }
}
