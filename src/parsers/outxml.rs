//! # FLEUR out.xml 解析器
//!
//! 从 out.xml 中读取结构（嵌入的 `fleurInput`）以及最后一次 SCF 迭代的结果。
//!
//! ## 提取的物理量
//! - 总能量: `totalEnergy@value`
//! - 自由能: `totalEnergy/freeEnergy@value`（缺失时取总能量）
//! - 费米能级: `FermiEnergy@value`
//! - 原子力: `totalForcesOnRepresentativeAtoms/forceTotal@F_x,F_y,F_z`
//! - 磁矩: `magneticMomentsInMTSpheres/magneticMoment@moment`
//! - 晶胞总磁矩: `allElectronCharges/spinDependentCharge@total`（自旋 1 减自旋 2）
//! - 原子电荷: `valenceDensity//mtCharge@total`（各自旋求和）加 `coreStates/state@weight`
//!
//! 力、磁矩和电荷按原子类型给出，按原子组的原子数展开为逐原子数据。
//! 单位为 Htr 的值换算为 eV。
//!
//! 另外读取嵌入输入中的 k 点列表，以及最后一次迭代的 `eigenvalues/eigenvaluesAt`（Htr → eV）。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `calculator/`, `commands/` 使用
//! - 使用 `document/`, `parsers/inpxml.rs`, `models/`

use super::inpxml::{self, parse_value, InputStructure, INPUT_ROOT};
use crate::document::{self, Element};
use crate::error::{FleurError, Result};
use crate::models::{
    CalculationResult, KPoint, KPointEigenvalues, Property, PropertyValue, Structure, HTR_TO_EV,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// out.xml 根元素名
pub const OUTPUT_ROOT: &str = "fleurOutput";

/// 默认的电荷密度收敛阈值 (me/bohr³)
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 1e-6;

/// out.xml 读取选项
#[derive(Debug, Clone)]
pub struct OutxmlOptions {
    /// 必须存在的物理量
    pub properties: BTreeSet<Property>,
    /// 密度距离不小于该值视为未收敛
    pub distance_threshold: f64,
}

impl Default for OutxmlOptions {
    fn default() -> Self {
        OutxmlOptions {
            properties: BTreeSet::from([Property::Energy]),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl OutxmlOptions {
    pub fn with_properties(properties: impl IntoIterator<Item = Property>) -> Self {
        OutxmlOptions {
            properties: properties.into_iter().collect(),
            ..Default::default()
        }
    }
}

/// out.xml 的解析结果
#[derive(Debug, Clone)]
pub struct FleurOutput {
    pub structure: Structure,
    pub result: CalculationResult,
    /// `programVersion@version`，如 `fleur 36`
    pub version: Option<String>,
    /// 计算使用的不可约 k 点
    pub kpoints: Vec<KPoint>,
    /// 最后一次迭代的本征值，未输出时为空
    pub eigenvalues: Vec<KPointEigenvalues>,
}

/// 解析 out.xml 文件
pub fn parse_outxml_file(path: &Path, options: &OutxmlOptions) -> Result<FleurOutput> {
    let bytes = fs::read(path).map_err(|e| FleurError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    read_outxml(&bytes, options)
}

/// 只读取 out.xml 中的结构，不检查计算是否完成
pub fn read_outxml_structure(bytes: &[u8]) -> Result<Structure> {
    let root = load_root(bytes)?;
    Ok(embedded_input(&root)?.structure)
}

/// 最后一次 SCF 迭代的收敛状态
#[derive(Debug, Clone, PartialEq)]
pub struct ScfStatus {
    /// 最后一次迭代的全局编号
    pub iterations: usize,
    /// 电荷密度距离
    pub distance: Option<f64>,
    /// `ERROR` 元素中的信息
    pub error: Option<String>,
}

impl ScfStatus {
    /// 计算已正常结束但尚未达到收敛阈值，继续运行可能收敛
    pub fn needs_more_iterations(&self, threshold: f64) -> bool {
        self.error.is_none()
            && self.iterations > 0
            && self.distance.map_or(false, |d| d >= threshold)
    }
}

/// 读取收敛状态，不提取物理量
pub fn scf_status(bytes: &[u8]) -> Result<ScfStatus> {
    let root = load_root(bytes)?;
    Ok(status_of(&root)?.0)
}

/// 读取结构及最后一次迭代的结果
pub fn read_outxml(bytes: &[u8], options: &OutxmlOptions) -> Result<FleurOutput> {
    let root = load_root(bytes)?;
    let input = embedded_input(&root)?;
    let (status, last) = status_of(&root)?;

    if let Some(message) = status.error {
        return Err(FleurError::IncompleteResult {
            reason: format!("FLEUR reported an error: {}", message),
        });
    }
    let iteration = last.ok_or_else(|| FleurError::IncompleteResult {
        reason: "no SCF iteration found in out.xml".to_string(),
    })?;
    let iterations = status.iterations;
    let distance = status.distance;

    match distance {
        Some(d) if d < options.distance_threshold => {}
        Some(d) => {
            return Err(FleurError::IncompleteResult {
                reason: format!(
                    "SCF not converged after {} iterations: distance {} >= {}",
                    iterations, d, options.distance_threshold
                ),
            })
        }
        None => {
            return Err(FleurError::IncompleteResult {
                reason: "no density convergence information in last iteration".to_string(),
            })
        }
    }

    let values = extract_values(iteration, &input)?;
    let kpoints = match (&input.structure.lattice, root.child(INPUT_ROOT)) {
        (Some(lattice), Some(input_el)) => inpxml::read_kpoints(input_el, lattice)?,
        _ => Vec::new(),
    };
    let eigenvalues = read_eigenvalues(iteration, kpoints.len())?;
    tracing::debug!(
        iterations,
        distance = ?distance,
        found = values.len(),
        "parsed out.xml"
    );

    let result = CalculationResult::from_values(&options.properties, values, iterations, distance)?;

    Ok(FleurOutput {
        structure: input.structure,
        result,
        version: root
            .child("programVersion")
            .and_then(|p| p.attr("version"))
            .map(|v| v.trim().to_string()),
        kpoints,
        eigenvalues,
    })
}

fn status_of(root: &Element) -> Result<(ScfStatus, Option<&Element>)> {
    let error = root
        .find_descendant("ERROR")
        .map(|e| e.attr("Message").unwrap_or("unknown error").to_string());

    let (count, last) = root
        .descendants()
        .filter(|e| e.name == "iteration")
        .fold((0usize, None), |(n, _), it| (n + 1, Some(it)));
    let iterations = match last.and_then(|it| it.attr("overallNumber")) {
        Some(v) => v.trim().parse().unwrap_or(count),
        None => count,
    };
    let distance = match last {
        Some(it) => density_distance(it)?,
        None => None,
    };

    Ok((
        ScfStatus {
            iterations,
            distance,
            error,
        },
        last,
    ))
}

fn load_root(bytes: &[u8]) -> Result<Element> {
    let root = document::parse(bytes)?;
    if root.name != OUTPUT_ROOT && root.attr("fleurOutputVersion").is_none() {
        return Err(FleurError::MissingElement {
            path: OUTPUT_ROOT.to_string(),
        });
    }
    Ok(root)
}

fn embedded_input(root: &Element) -> Result<InputStructure> {
    let input = root.child(INPUT_ROOT).ok_or_else(|| FleurError::MissingElement {
        path: format!("{}/{}", OUTPUT_ROOT, INPUT_ROOT),
    })?;
    inpxml::read_input_structure(input, &format!("{}/{}", OUTPUT_ROOT, INPUT_ROOT))
}

fn density_distance(iteration: &Element) -> Result<Option<f64>> {
    let Some(conv) = iteration.find_descendant("densityConvergence") else {
        return Ok(None);
    };
    let el = conv
        .child("overallChargeDensity")
        .filter(|e| e.attr("distance").is_some())
        .or_else(|| conv.child("chargeDensity"));

    match el.and_then(|e| e.attr("distance")) {
        Some(v) => parse_value(v, "densityConvergence/@distance").map(Some),
        None => Ok(None),
    }
}

/// Htr 单位换算为 eV，其它单位原样返回
fn to_ev(el: &Element, value: f64) -> f64 {
    match el.attr("units") {
        Some(u) if u.trim().to_ascii_lowercase().starts_with("htr") => value * HTR_TO_EV,
        _ => value,
    }
}

fn scalar(el: &Element, path: &str) -> Result<Option<f64>> {
    match el.attr("value") {
        Some(v) => Ok(Some(to_ev(el, parse_value(v, path)?))),
        None => Ok(None),
    }
}

fn extract_values(
    iteration: &Element,
    input: &InputStructure,
) -> Result<BTreeMap<Property, PropertyValue>> {
    let mut values = BTreeMap::new();

    if let Some(total) = iteration.find_descendant("totalEnergy") {
        if let Some(energy) = scalar(total, "totalEnergy/@value")? {
            values.insert(Property::Energy, PropertyValue::Scalar(energy));
            let free = match total.child("freeEnergy") {
                Some(f) => scalar(f, "totalEnergy/freeEnergy/@value")?.unwrap_or(energy),
                None => energy,
            };
            values.insert(Property::FreeEnergy, PropertyValue::Scalar(free));
        }
    }

    if let Some(fermi) = iteration.find_descendant("FermiEnergy") {
        if let Some(ef) = scalar(fermi, "FermiEnergy/@value")? {
            values.insert(Property::FermiLevel, PropertyValue::Scalar(ef));
        }
    }

    if let Some(forces) = iteration.find_descendant("totalForcesOnRepresentativeAtoms") {
        let path = "totalForcesOnRepresentativeAtoms/forceTotal";
        let mut per_type = BTreeMap::new();
        for f in forces.children_named("forceTotal") {
            let atom_type = atom_type(f, path)?;
            let mut v = [0.0; 3];
            for (c, name) in v.iter_mut().zip(["F_x", "F_y", "F_z"]) {
                let raw = f.attr(name).ok_or_else(|| FleurError::MissingElement {
                    path: format!("{}/@{}", path, name),
                })?;
                *c = to_ev(forces, parse_value(raw, &format!("{}/@{}", path, name))?);
            }
            per_type.insert(atom_type, v);
        }
        let per_atom = expand_per_type(&per_type, input, path)?;
        values.insert(Property::Forces, PropertyValue::Vectors(per_atom));
    }

    if let Some(moments) = iteration.find_descendant("magneticMomentsInMTSpheres") {
        let path = "magneticMomentsInMTSpheres/magneticMoment";
        let mut per_type = BTreeMap::new();
        for m in moments.children_named("magneticMoment") {
            let atom_type = atom_type(m, path)?;
            let raw = m.attr("moment").ok_or_else(|| FleurError::MissingElement {
                path: format!("{}/@moment", path),
            })?;
            per_type.insert(atom_type, parse_value(raw, &format!("{}/@moment", path))?);
        }
        let per_atom = expand_per_type(&per_type, input, path)?;
        values.insert(Property::MagneticMoments, PropertyValue::PerAtom(per_atom));
    }

    if let Some(moment) = cell_magnetic_moment(iteration)? {
        values.insert(Property::CellMagneticMoment, PropertyValue::Scalar(moment));
    }

    if let Some(per_type) = atom_charges(iteration)? {
        let per_atom = expand_per_type(&per_type, input, "valenceDensity//mtCharge")?;
        values.insert(Property::Charges, PropertyValue::PerAtom(per_atom));
    }

    Ok(values)
}

/// 晶胞总磁矩：全电子自旋向上与向下电荷之差
fn cell_magnetic_moment(iteration: &Element) -> Result<Option<f64>> {
    let Some(charges) = iteration.find_descendant("allElectronCharges") else {
        return Ok(None);
    };
    let path = "allElectronCharges/spinDependentCharge/@total";
    let mut by_spin = BTreeMap::new();
    for c in charges.children_named("spinDependentCharge") {
        if let (Some(spin), Some(total)) = (c.attr("spin"), c.attr("total")) {
            by_spin.insert(spin.trim().to_string(), parse_value(total, path)?);
        }
    }
    match (by_spin.get("1"), by_spin.get("2")) {
        (Some(up), Some(down)) => Ok(Some(up - down)),
        _ => Ok(None),
    }
}

/// 每个原子类型的电荷：muffin-tin 价电荷（各自旋之和）加芯电子数
///
/// 自旋极化计算中芯态按自旋重复输出，只计自旋 1 的权重。
/// 缺少价电荷或芯态信息时返回 `None`。
fn atom_charges(iteration: &Element) -> Result<Option<BTreeMap<usize, f64>>> {
    let Some(valence) = iteration.find_descendant("valenceDensity") else {
        return Ok(None);
    };
    let path = "valenceDensity//mtCharge";
    let mut per_type: BTreeMap<usize, f64> = BTreeMap::new();
    for mt in valence.descendants().filter(|e| e.name == "mtCharge") {
        let t = atom_type(mt, path)?;
        let raw = mt.attr("total").ok_or_else(|| FleurError::MissingElement {
            path: format!("{}/@total", path),
        })?;
        *per_type.entry(t).or_insert(0.0) += parse_value(raw, &format!("{}/@total", path))?;
    }
    if per_type.is_empty() {
        return Ok(None);
    }

    let core: Vec<&Element> = iteration
        .descendants()
        .filter(|e| e.name == "coreStates")
        .collect();
    if core.is_empty() {
        tracing::warn!("out.xml has muffin-tin charges but no core states, skipping atom charges");
        return Ok(None);
    }
    let polarized = core.iter().any(|c| c.attr("spin").map(str::trim) == Some("2"));

    let path = "coreStates/state/@weight";
    for states in core {
        if polarized && states.attr("spin").map(str::trim) != Some("1") {
            continue;
        }
        let t = atom_type(states, "coreStates")?;
        let mut weight = 0.0;
        for state in states.children_named("state") {
            if let Some(w) = state.attr("weight") {
                weight += parse_value(w, path)?;
            }
        }
        if let Some(charge) = per_type.get_mut(&t) {
            *charge += weight;
        }
    }
    Ok(Some(per_type))
}

/// 读取最后一次迭代中各 k 点的本征值
///
/// k 点列表为空（由外部文件引入）时不检查 `ikpt`。
fn read_eigenvalues(iteration: &Element, kpoint_count: usize) -> Result<Vec<KPointEigenvalues>> {
    let Some(eigenvalues) = iteration.find_descendant("eigenvalues") else {
        return Ok(Vec::new());
    };
    let path = "eigenvalues/eigenvaluesAt";
    let mut out = Vec::new();
    for at in eigenvalues.children_named("eigenvaluesAt") {
        let index = |name: &str, default: Option<usize>| -> Result<usize> {
            match at.attr(name) {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|&v| v >= 1)
                    .ok_or_else(|| FleurError::InvalidValue {
                        path: format!("{}/@{}", path, name),
                        value: raw.to_string(),
                    }),
                None => default.ok_or_else(|| FleurError::MissingElement {
                    path: format!("{}/@{}", path, name),
                }),
            }
        };
        let spin = index("spin", Some(1))? - 1;
        let kpoint = index("ikpt", None)? - 1;
        if kpoint_count > 0 && kpoint >= kpoint_count {
            return Err(FleurError::InvalidValue {
                path: format!("{}/@ikpt", path),
                value: format!("{} (only {} k-points)", kpoint + 1, kpoint_count),
            });
        }

        let htr = at
            .attr("units")
            .map_or(true, |u| u.trim().to_ascii_lowercase().starts_with("htr"));
        let eigenvalues = at
            .text()
            .unwrap_or("")
            .split_whitespace()
            .map(|v| parse_value(v, path).map(|e| if htr { e * HTR_TO_EV } else { e }))
            .collect::<Result<Vec<f64>>>()?;

        out.push(KPointEigenvalues {
            spin,
            kpoint,
            eigenvalues,
        });
    }
    Ok(out)
}

fn atom_type(el: &Element, path: &str) -> Result<usize> {
    let raw = el.attr("atomType").ok_or_else(|| FleurError::MissingElement {
        path: format!("{}/@atomType", path),
    })?;
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|&t| t >= 1)
        .ok_or_else(|| FleurError::InvalidValue {
            path: format!("{}/@atomType", path),
            value: raw.to_string(),
        })
}

/// 按原子组原子数将逐类型数据展开为逐原子数据
fn expand_per_type<T: Copy>(
    per_type: &BTreeMap<usize, T>,
    input: &InputStructure,
    path: &str,
) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(input.structure.len());
    for (i, &n) in input.group_sizes.iter().enumerate() {
        let value = per_type.get(&(i + 1)).ok_or_else(|| FleurError::InvalidValue {
            path: path.to_string(),
            value: format!("missing entry for atom type {}", i + 1),
        })?;
        out.extend(std::iter::repeat(*value).take(n));
    }

    if out.len() != input.structure.len() || per_type.len() != input.group_sizes.len() {
        return Err(FleurError::InvalidValue {
            path: path.to_string(),
            value: format!(
                "{} atom types for {} atom groups",
                per_type.len(),
                input.group_sizes.len()
            ),
        });
    }
    Ok(out)
}
