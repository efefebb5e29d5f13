//! # 原子结构数据模型
//!
//! 定义统一的原子结构表示：有序原子列表、可选晶格、各方向周期性。
//! 所有长度以 bohr 为单位保存，与 FLEUR 三种文件格式一致，读写时不做单位换算。
//!
//! ## 依赖关系
//! - 被 `parsers/` 和 `calculator/` 使用
//! - 使用 `error.rs`

use crate::error::{FleurError, Result};
use serde::{Deserialize, Serialize};

/// 1 bohr 对应的 Å 数
pub const BOHR_TO_ANGSTROM: f64 = 0.529_177_210_903;

/// 行列式绝对值低于该阈值的晶格视为退化
const DEGENERATE_DET: f64 = 1e-10;

/// 晶格参数表示
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let (sin_gamma, cos_gamma) = gamma.to_radians().sin_cos();

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [
                [a, 0.0, 0.0],
                [b * cos_gamma, b * sin_gamma, 0.0],
                [c1, c2, c3],
            ],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;

        let a = norm(a_vec);
        let b = norm(b_vec);
        let c = norm(c_vec);

        let alpha = (dot(b_vec, c_vec) / (b * c)).acos().to_degrees();
        let beta = (dot(a_vec, c_vec) / (a * c)).acos().to_degrees();
        let gamma = (dot(a_vec, b_vec) / (a * b)).acos().to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 晶格矩阵行列式（带符号体积）
    pub fn determinant(&self) -> f64 {
        let [a, b, c] = self.matrix;
        a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
            + a[2] * (b[0] * c[1] - b[1] * c[0])
    }

    /// 计算晶格体积 (bohr³)
    pub fn volume(&self) -> f64 {
        self.determinant().abs()
    }

    /// 晶格是否退化（三个向量共面）
    pub fn is_degenerate(&self) -> bool {
        self.determinant().abs() < DEGENERATE_DET
    }

    /// 分数坐标转笛卡尔坐标
    pub fn to_cartesian(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }

    /// 笛卡尔坐标转分数坐标
    ///
    /// 晶格退化时返回 `InvalidStructure`。
    pub fn to_fractional(&self, cart: [f64; 3]) -> Result<[f64; 3]> {
        // 行向量约定下 cart = frac · M，故 frac = cart · M⁻¹
        let inv = self.inverse()?;
        Ok([
            cart[0] * inv[0][0] + cart[1] * inv[1][0] + cart[2] * inv[2][0],
            cart[0] * inv[0][1] + cart[1] * inv[1][1] + cart[2] * inv[2][1],
            cart[0] * inv[0][2] + cart[1] * inv[1][2] + cart[2] * inv[2][2],
        ])
    }

    /// 倒格子，行向量 b_j 满足 a_i · b_j = 2π δ_ij (1/bohr)
    pub fn reciprocal(&self) -> Result<Lattice> {
        let inv = self.inverse()?;
        let mut matrix = [[0.0; 3]; 3];
        for (j, row) in matrix.iter_mut().enumerate() {
            for (k, v) in row.iter_mut().enumerate() {
                *v = 2.0 * std::f64::consts::PI * inv[k][j];
            }
        }
        Ok(Lattice { matrix })
    }

    fn inverse(&self) -> Result<[[f64; 3]; 3]> {
        let m = self.matrix;
        let det = self.determinant();
        if det.abs() < DEGENERATE_DET {
            return Err(FleurError::InvalidStructure(
                "lattice is degenerate (zero determinant)".to_string(),
            ));
        }

        Ok([
            [
                (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
            ],
            [
                (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
            ],
            [
                (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
            ],
        ])
    }

    /// 每个晶格向量乘以对应的缩放因子
    pub fn scaled(&self, factors: [f64; 3]) -> Self {
        let mut matrix = self.matrix;
        for (row, f) in matrix.iter_mut().zip(factors) {
            for v in row.iter_mut() {
                *v *= f;
            }
        }
        Lattice { matrix }
    }
}

/// 原子信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 笛卡尔坐标 [x, y, z] (bohr)
    pub position: [f64; 3],

    /// 可选：原子种类编号（inpgen 中 `Z.tag` 的小数部分）
    pub tag: Option<u32>,

    /// 可选：各方向是否允许弛豫（inp.xml 中的 `relaxXYZ`）
    pub relax: Option<[bool; 3]>,
}

impl Atom {
    pub fn new(element: impl Into<String>, position: [f64; 3]) -> Self {
        Atom {
            element: element.into(),
            position,
            tag: None,
            relax: None,
        }
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_relax(mut self, relax: [bool; 3]) -> Self {
        self.relax = Some(relax);
        self
    }
}

/// 原子结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// 原子列表（顺序有意义）
    pub atoms: Vec<Atom>,

    /// 晶格，非周期体系为 `None`
    pub lattice: Option<Lattice>,

    /// 各方向周期性
    pub pbc: [bool; 3],
}

impl Structure {
    /// 创建结构，校验晶格非退化
    pub fn new(atoms: Vec<Atom>, lattice: Option<Lattice>, pbc: [bool; 3]) -> Result<Self> {
        if let Some(lat) = &lattice {
            if lat.is_degenerate() {
                return Err(FleurError::InvalidStructure(
                    "lattice is degenerate (zero determinant)".to_string(),
                ));
            }
        }
        Ok(Structure {
            atoms,
            lattice,
            pbc,
        })
    }

    /// 三维周期性体相结构
    pub fn bulk(atoms: Vec<Atom>, lattice: Lattice) -> Result<Self> {
        Structure::new(atoms, Some(lattice), [true; 3])
    }

    /// 非周期分子
    pub fn molecule(atoms: Vec<Atom>) -> Self {
        Structure {
            atoms,
            lattice: None,
            pbc: [false; 3],
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// 薄膜体系：x, y 周期，z 非周期
    pub fn is_film(&self) -> bool {
        self.pbc == [true, true, false]
    }

    /// 元素符号序列
    pub fn symbols(&self) -> Vec<&str> {
        self.atoms.iter().map(|a| a.element.as_str()).collect()
    }

    /// 全部原子的分数坐标
    pub fn fractional_positions(&self) -> Result<Vec<[f64; 3]>> {
        let lattice = self.lattice.as_ref().ok_or_else(|| {
            FleurError::InvalidStructure("structure has no lattice".to_string())
        })?;
        self.atoms
            .iter()
            .map(|a| lattice.to_fractional(a.position))
            .collect()
    }

    /// 计算化学式
    pub fn formula(&self) -> String {
        use std::collections::BTreeMap;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

        for atom in &self.atoms {
            *counts.entry(atom.element.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 晶胞体积 (bohr³)
    pub fn volume(&self) -> Option<f64> {
        self.lattice.as_ref().map(Lattice::volume)
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(v: [f64; 3]) -> f64 {
    dot(v, v).sqrt()
}
