//! # FLEUR inp.xml 解析器
//!
//! 从 inp.xml 文档树中提取晶格、原子种类和原子组，组装原子结构。
//! out.xml 中嵌入的 `fleurInput` 也由本模块解析。
//!
//! ## inp.xml 结构（节选）
//! ```text
//! <fleurInput fleurInputVersion="0.34">
//!    <cell>
//!       <bulkLattice scale="1.0">              (薄膜为 filmLattice)
//!          <bravaisMatrix>
//!             <row-1>0.0 5.13 5.13</row-1> ...
//!    <atomSpecies>
//!       <species name="Si-1" element="Si" atomicNumber="14"> ...
//!    <atomGroups>
//!       <atomGroup species="Si-1">
//!          <relPos label="1">1/8 1/8 1/8</relPos>     (absPos / filmPos)
//!          <force calculate="T" relaxXYZ="TTT"/>
//! ```
//!
//! 不支持由结构生成 inp.xml（由 inpgen 生成），
//! 只支持对现有 inp.xml 做属性级修改。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `parsers/outxml.rs`, `calculator/` 使用
//! - 使用 `document/`, `models/`

use crate::document::{self, Element};
use crate::error::{FleurError, Result};
use crate::models::{elements, Atom, KPoint, Lattice, Structure};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// inp.xml 根元素名
pub const INPUT_ROOT: &str = "fleurInput";

/// 从 `fleurInput` 元素中提取的结构及各原子组的原子数
#[derive(Debug, Clone)]
pub struct InputStructure {
    pub structure: Structure,
    /// 第 i 个原子组（即 FLEUR 的第 i+1 个 atomType）包含的原子数
    pub group_sizes: Vec<usize>,
}

/// 对 inp.xml 中某类元素的属性修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// 元素本地名，如 `scfLoop`
    pub tag: String,
    /// 属性名，如 `itmax`
    pub name: String,
    pub value: String,
}

impl AttributeChange {
    pub fn new(tag: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        AttributeChange {
            tag: tag.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// 解析 inp.xml 文件
pub fn parse_inpxml_file(path: &Path) -> Result<Structure> {
    let bytes = fs::read(path).map_err(|e| FleurError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_inpxml_content(&bytes)
}

/// 从字节内容解析 inp.xml
pub fn parse_inpxml_content(bytes: &[u8]) -> Result<Structure> {
    let root = document::parse(bytes)?;
    if root.name != INPUT_ROOT {
        return Err(FleurError::MissingElement {
            path: INPUT_ROOT.to_string(),
        });
    }
    Ok(read_input_structure(&root, INPUT_ROOT)?.structure)
}

/// 从 `fleurInput` 元素组装结构；`base` 为该元素的路径，用于错误定位
pub fn read_input_structure(input: &Element, base: &str) -> Result<InputStructure> {
    let cell = require(input, "cell", base)?;
    let cell_path = format!("{}/cell", base);

    let (lattice_el, pbc, lattice_path) = if let Some(el) = cell.child("bulkLattice") {
        (el, [true; 3], format!("{}/bulkLattice", cell_path))
    } else if let Some(el) = cell.child("filmLattice") {
        (el, [true, true, false], format!("{}/filmLattice", cell_path))
    } else {
        return Err(FleurError::MissingElement {
            path: format!("{}/bulkLattice", cell_path),
        });
    };

    let lattice = read_lattice(lattice_el, &lattice_path)?;
    if lattice.is_degenerate() {
        return Err(FleurError::InvalidValue {
            path: format!("{}/bravaisMatrix", lattice_path),
            value: "degenerate lattice".to_string(),
        });
    }

    let species = read_species(input, base)?;

    let groups_el = require(input, "atomGroups", base)?;
    let groups_path = format!("{}/atomGroups", base);

    let mut atoms = Vec::new();
    let mut group_sizes = Vec::new();
    for (i, group) in groups_el.children_named("atomGroup").enumerate() {
        let group_path = format!("{}/atomGroup[{}]", groups_path, i + 1);
        let species_name = group
            .attr("species")
            .ok_or_else(|| FleurError::MissingElement {
                path: format!("{}/@species", group_path),
            })?;
        let element = species
            .get(species_name)
            .ok_or_else(|| FleurError::MissingElement {
                path: format!("{}/atomSpecies/species[@name='{}']", base, species_name),
            })?;

        let relax = match group.child("force").and_then(|f| f.attr("relaxXYZ")) {
            Some(flags) => Some(parse_relax(flags, &format!("{}/force/@relaxXYZ", group_path))?),
            None => None,
        };

        let before = atoms.len();
        for pos in &group.children {
            let pos_path = format!("{}/{}", group_path, pos.name);
            let position = match pos.name.as_str() {
                "relPos" => lattice.to_cartesian(read_triple(pos, &pos_path)?),
                "absPos" => read_triple(pos, &pos_path)?,
                "filmPos" => {
                    let v = read_triple(pos, &pos_path)?;
                    let mut cart = lattice.to_cartesian([v[0], v[1], 0.0]);
                    cart[2] += v[2];
                    cart
                }
                _ => continue,
            };
            let mut atom = Atom::new(element.clone(), position);
            atom.relax = relax;
            atoms.push(atom);
        }

        if atoms.len() == before {
            return Err(FleurError::MissingElement {
                path: format!("{}/relPos", group_path),
            });
        }
        group_sizes.push(atoms.len() - before);
    }

    if group_sizes.is_empty() {
        return Err(FleurError::MissingElement {
            path: format!("{}/atomGroup", groups_path),
        });
    }

    Ok(InputStructure {
        structure: Structure::new(atoms, Some(lattice), pbc)?,
        group_sizes,
    })
}

fn require<'a>(parent: &'a Element, name: &str, base: &str) -> Result<&'a Element> {
    parent.child(name).ok_or_else(|| FleurError::MissingElement {
        path: format!("{}/{}", base, name),
    })
}

/// 读取晶格：优先 `bravaisMatrix`，否则按 `latnam` + `a1` 构造
fn read_lattice(el: &Element, path: &str) -> Result<Lattice> {
    let scale = match el.attr("scale") {
        Some(v) => parse_value(v, &format!("{}/@scale", path))?,
        None => 1.0,
    };
    let scale = if scale == 0.0 { 1.0 } else { scale };

    let lattice = if let Some(matrix) = el.child("bravaisMatrix") {
        let matrix_path = format!("{}/bravaisMatrix", path);
        let mut rows = [[0.0; 3]; 3];
        for (i, row) in rows.iter_mut().enumerate() {
            let name = format!("row-{}", i + 1);
            let row_el = require(matrix, &name, &matrix_path)?;
            *row = read_triple(row_el, &format!("{}/{}", matrix_path, name))?;
        }
        Lattice::from_vectors(rows)
    } else {
        let a1_el = require(el, "a1", path)?;
        let a1 = read_scalar(a1_el, &format!("{}/a1", path))?;
        let h = a1 / 2.0;
        match el.attr("latnam").unwrap_or("any") {
            "cub" => Lattice::from_vectors([[a1, 0.0, 0.0], [0.0, a1, 0.0], [0.0, 0.0, a1]]),
            "fcc" => Lattice::from_vectors([[0.0, h, h], [h, 0.0, h], [h, h, 0.0]]),
            "bcc" => Lattice::from_vectors([[-h, h, h], [h, -h, h], [h, h, -h]]),
            _ => {
                return Err(FleurError::MissingElement {
                    path: format!("{}/bravaisMatrix", path),
                })
            }
        }
    };

    Ok(lattice.scaled([scale; 3]))
}

/// species 名称 → 元素符号
fn read_species(input: &Element, base: &str) -> Result<HashMap<String, String>> {
    let species_el = require(input, "atomSpecies", base)?;
    let mut map = HashMap::new();

    for (i, sp) in species_el.children_named("species").enumerate() {
        let path = format!("{}/atomSpecies/species[{}]", base, i + 1);
        let name = sp.attr("name").ok_or_else(|| FleurError::MissingElement {
            path: format!("{}/@name", path),
        })?;

        let symbol = match (sp.attr("element"), sp.attr("atomicNumber")) {
            (Some(el), _) => elements::normalize(el).ok_or_else(|| FleurError::InvalidValue {
                path: format!("{}/@element", path),
                value: el.to_string(),
            })?,
            (None, Some(z)) => z
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(elements::symbol)
                .ok_or_else(|| FleurError::InvalidValue {
                    path: format!("{}/@atomicNumber", path),
                    value: z.to_string(),
                })?,
            (None, None) => {
                return Err(FleurError::MissingElement {
                    path: format!("{}/@element", path),
                })
            }
        };
        map.insert(name.to_string(), symbol.to_string());
    }

    Ok(map)
}

fn parse_relax(flags: &str, path: &str) -> Result<[bool; 3]> {
    let chars: Vec<char> = flags.trim().chars().collect();
    if chars.len() != 3 {
        return Err(FleurError::InvalidValue {
            path: path.to_string(),
            value: flags.to_string(),
        });
    }
    let mut relax = [false; 3];
    for (r, c) in relax.iter_mut().zip(chars) {
        *r = match c {
            'T' | 't' => true,
            'F' | 'f' => false,
            _ => {
                return Err(FleurError::InvalidValue {
                    path: path.to_string(),
                    value: flags.to_string(),
                })
            }
        };
    }
    Ok(relax)
}

fn read_scalar(el: &Element, path: &str) -> Result<f64> {
    let text = el.text().ok_or_else(|| FleurError::InvalidValue {
        path: path.to_string(),
        value: String::new(),
    })?;
    parse_value(text, path)
}

pub(crate) fn read_triple(el: &Element, path: &str) -> Result<[f64; 3]> {
    let text = el.text().unwrap_or("");
    let values = text
        .split_whitespace()
        .map(|v| parse_value(v, path))
        .collect::<Result<Vec<f64>>>()?;

    match values.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(FleurError::InvalidValue {
            path: path.to_string(),
            value: text.to_string(),
        }),
    }
}

/// 读取计算使用的 k 点列表
///
/// 新格式 (`kPointLists`) 按 `kPointListSelection@listName` 选择列表，找不到时取第一个；
/// 旧格式直接读取 `bzIntegration/kPointList`，坐标除以 `posScale`。
/// k 点由外部文件引入时返回空列表。权重归一化为总和 1。
pub fn read_kpoints(input: &Element, lattice: &Lattice) -> Result<Vec<KPoint>> {
    let Some(bz) = input.find_descendant("bzIntegration") else {
        return Ok(Vec::new());
    };
    let list = match bz.child("kPointLists") {
        Some(lists) => {
            let selected = bz.child("kPointListSelection").and_then(|s| s.attr("listName"));
            lists
                .children_named("kPointList")
                .find(|l| selected.is_some() && l.attr("name") == selected)
                .or_else(|| lists.child("kPointList"))
        }
        None => bz.child("kPointList"),
    };
    let Some(list) = list else {
        return Ok(Vec::new());
    };

    let path = "bzIntegration/kPointList";
    let optional = |name: &str| -> Result<f64> {
        match list.attr(name) {
            Some(v) => parse_value(v, &format!("{}/@{}", path, name)),
            None => Ok(1.0),
        }
    };
    let pos_scale = optional("posScale")?;
    let weight_scale = optional("weightScale")?;
    if pos_scale == 0.0 || weight_scale == 0.0 {
        return Err(FleurError::InvalidValue {
            path: path.to_string(),
            value: "zero posScale or weightScale".to_string(),
        });
    }

    let reciprocal = lattice.reciprocal()?;
    let mut kpoints = Vec::new();
    for kp in list.children_named("kPoint") {
        let frac = read_triple(kp, &format!("{}/kPoint", path))?;
        let weight = match kp.attr("weight") {
            Some(w) => parse_value(w, &format!("{}/kPoint/@weight", path))? / weight_scale,
            None => 1.0,
        };
        kpoints.push(KPoint {
            coordinates: reciprocal.to_cartesian(frac.map(|v| v / pos_scale)),
            weight,
        });
    }

    let total: f64 = kpoints.iter().map(|k| k.weight).sum();
    if total > 0.0 {
        for k in &mut kpoints {
            k.weight /= total;
        }
    }
    Ok(kpoints)
}

/// 解析数值，出错时附带路径
pub(crate) fn parse_value(text: &str, path: &str) -> Result<f64> {
    parse_fleur_number(text).ok_or_else(|| FleurError::InvalidValue {
        path: path.to_string(),
        value: text.to_string(),
    })
}

/// 解析 FLEUR 数值，支持分数写法 `1/8`、`-1.0/3.0`
pub fn parse_fleur_number(text: &str) -> Option<f64> {
    let text = text.trim();
    match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => text.parse().ok(),
    }
}

/// 修改 inp.xml 中所有匹配元素的属性，返回重新序列化的文档
///
/// 某个修改找不到目标元素时返回 `MissingElement`。
pub fn set_inpxml_attributes(bytes: &[u8], changes: &[AttributeChange]) -> Result<Vec<u8>> {
    let mut root = document::parse(bytes)?;
    if root.name != INPUT_ROOT {
        return Err(FleurError::MissingElement {
            path: INPUT_ROOT.to_string(),
        });
    }

    for change in changes {
        let count = root.update_named(&change.tag, &mut |el: &mut Element| {
            el.set_attr(change.name.as_str(), change.value.as_str())
        });
        if count == 0 {
            return Err(FleurError::MissingElement {
                path: format!("{}//{}", INPUT_ROOT, change.tag),
            });
        }
        tracing::debug!(
            tag = %change.tag,
            attribute = %change.name,
            value = %change.value,
            count,
            "updated inp.xml attribute"
        );
    }

    Ok(root.to_bytes())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SI_INPXML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<fleurInput fleurInputVersion="0.34">
   <comment>
      Si bulk
   </comment>
   <calculationSetup>
      <cutoffs Kmax="3.80000000" Gmax="11.40000000" GmaxXC="9.50000000" numbands="0"/>
      <scfLoop itmax="15" minDistance=".00001000" maxIterBroyd="99" imix="Anderson" alpha=".05000000"/>
   </calculationSetup>
   <cell>
      <bulkLattice scale="1.0000000000">
         <bravaisMatrix>
            <row-1>.0000000000 5.1306085335 5.1306085335</row-1>
            <row-2>5.1306085335 .0000000000 5.1306085335</row-2>
            <row-3>5.1306085335 5.1306085335 .0000000000</row-3>
         </bravaisMatrix>
      </bulkLattice>
   </cell>
   <atomSpecies>
      <species name="Si-1" element="Si" atomicNumber="14">
         <mtSphere radius="2.17000000" gridPoints="717" logIncrement=".01600000"/>
      </species>
   </atomSpecies>
   <atomGroups>
      <atomGroup species="Si-1">
         <relPos label="                   1">1/8 1/8 1/8</relPos>
         <relPos label="                   2">-1/8 -1/8 -1/8</relPos>
         <force calculate="T" relaxXYZ="TTT"/>
      </atomGroup>
   </atomGroups>
</fleurInput>
"#;

    #[test]
    fn test_parse_si_inpxml() {
        let s = parse_inpxml_content(SI_INPXML.as_bytes()).unwrap();

        assert_eq!(s.symbols(), vec!["Si", "Si"]);
        assert_eq!(s.pbc, [true; 3]);
        let expected = [[1.28265213; 3], [-1.28265213; 3]];
        for (atom, exp) in s.atoms.iter().zip(expected) {
            for i in 0..3 {
                assert!((atom.position[i] - exp[i]).abs() < 1e-6);
            }
        }
        let m = s.lattice.unwrap().matrix;
        assert!((m[0][1] - 5.13060853).abs() < 1e-6);
        assert!(m[0][0].abs() < 1e-12);
        assert_eq!(s.atoms[0].relax, Some([true; 3]));
    }

    #[test]
    fn test_group_sizes() {
        let root = document::parse(SI_INPXML.as_bytes()).unwrap();
        let parsed = read_input_structure(&root, INPUT_ROOT).unwrap();
        assert_eq!(parsed.group_sizes, vec![2]);
    }

    #[test]
    fn test_missing_cell_names_path() {
        let xml = SI_INPXML.replace("<cell>", "<cellX>").replace("</cell>", "</cellX>");
        let err = parse_inpxml_content(xml.as_bytes()).unwrap_err();
        match err {
            FleurError::MissingElement { path } => assert_eq!(path, "fleurInput/cell"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_bravais_row() {
        let xml = SI_INPXML.replace(
            "<row-3>5.1306085335 5.1306085335 .0000000000</row-3>",
            "",
        );
        let err = parse_inpxml_content(xml.as_bytes()).unwrap_err();
        assert!(
            matches!(err, FleurError::MissingElement { ref path } if path.ends_with("bravaisMatrix/row-3"))
        );
    }

    #[test]
    fn test_invalid_position_value() {
        let xml = SI_INPXML.replace("1/8 1/8 1/8", "1/8 abc 1/8");
        let err = parse_inpxml_content(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, FleurError::InvalidValue { ref value, .. } if value == "abc"));
    }

    #[test]
    fn test_unknown_species_reference() {
        let xml = SI_INPXML.replace("atomGroup species=\"Si-1\"", "atomGroup species=\"Ge-1\"");
        let err = parse_inpxml_content(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, FleurError::MissingElement { .. }));
    }

    #[test]
    fn test_latnam_fcc_with_scale() {
        let xml = SI_INPXML.replace(
            r#"<bulkLattice scale="1.0000000000">
         <bravaisMatrix>
            <row-1>.0000000000 5.1306085335 5.1306085335</row-1>
            <row-2>5.1306085335 .0000000000 5.1306085335</row-2>
            <row-3>5.1306085335 5.1306085335 .0000000000</row-3>
         </bravaisMatrix>"#,
            r#"<bulkLattice scale="2.0" latnam="fcc">
         <a1>5.1306085335</a1>"#,
        );
        let s = parse_inpxml_content(xml.as_bytes()).unwrap();
        let m = s.lattice.unwrap().matrix;
        assert!((m[0][1] - 5.1306085335).abs() < 1e-9);
    }

    #[test]
    fn test_film_positions() {
        let xml = SI_INPXML
            .replace("bulkLattice", "filmLattice")
            .replace(
                r#"<relPos label="                   1">1/8 1/8 1/8</relPos>
         <relPos label="                   2">-1/8 -1/8 -1/8</relPos>"#,
                r#"<filmPos label="1">0.5 0.5 1.25</filmPos>"#,
            );
        let s = parse_inpxml_content(xml.as_bytes()).unwrap();
        assert!(s.is_film());
        assert_eq!(s.len(), 1);
        // 0.5*a1 + 0.5*a2 的 z 分量为 5.1306085335
        assert!((s.atoms[0].position[2] - (5.1306085335 + 1.25)).abs() < 1e-9);
    }

    #[test]
    fn test_parse_fleur_number() {
        assert_eq!(parse_fleur_number("1/8"), Some(0.125));
        assert_eq!(parse_fleur_number("-1.0/4.0"), Some(-0.25));
        assert_eq!(parse_fleur_number(".5"), Some(0.5));
        assert_eq!(parse_fleur_number("1/0"), None);
        assert_eq!(parse_fleur_number("x"), None);
    }

    #[test]
    fn test_set_attributes() {
        let changes = [AttributeChange::new("scfLoop", "itmax", "30")];
        let out = set_inpxml_attributes(SI_INPXML.as_bytes(), &changes).unwrap();
        let root = document::parse(&out).unwrap();
        let scf = root.find_path("calculationSetup/scfLoop").unwrap();
        assert_eq!(scf.attr("itmax"), Some("30"));
        assert_eq!(scf.attr("minDistance"), Some(".00001000"));

        // 结构不受影响
        let s = parse_inpxml_content(&out).unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_set_attributes_missing_tag() {
        let changes = [AttributeChange::new("noSuchTag", "x", "1")];
        let err = set_inpxml_attributes(SI_INPXML.as_bytes(), &changes).unwrap_err();
        assert!(matches!(err, FleurError::MissingElement { .. }));
    }

    fn cubic(a: f64) -> Lattice {
        Lattice::from_vectors([[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
    }

    #[test]
    fn test_kpoints_selected_list() {
        let xml = r#"<fleurInput>
   <cell>
      <bzIntegration valenceElectrons="8" mode="hist">
         <kPointListSelection listName="mesh"/>
         <kPointLists>
            <kPointList name="path" count="1" type="path">
               <kPoint weight="1.0">0.5 0.5 0.5</kPoint>
            </kPointList>
            <kPointList name="mesh" count="2" type="mesh">
               <kPoint weight="1.0">0.0 0.0 0.0</kPoint>
               <kPoint weight="3.0">1/2 0.0 0.0</kPoint>
            </kPointList>
         </kPointLists>
      </bzIntegration>
   </cell>
</fleurInput>"#;
        let root = document::parse(xml.as_bytes()).unwrap();
        let kpts = read_kpoints(&root, &cubic(8.0)).unwrap();

        assert_eq!(kpts.len(), 2);
        assert!((kpts[0].weight - 0.25).abs() < 1e-12);
        assert!((kpts[1].weight - 0.75).abs() < 1e-12);
        assert!((kpts[1].coordinates[0] - std::f64::consts::PI / 8.0).abs() < 1e-12);
        assert!(kpts[1].coordinates[1].abs() < 1e-12);
    }

    #[test]
    fn test_kpoints_legacy_scales() {
        let xml = r#"<fleurInput>
   <calculationSetup>
      <bzIntegration valenceElectrons="8" mode="hist">
         <kPointList posScale="4.0" weightScale="2.0" count="2">
            <kPoint weight="1.0">2.0 0.0 0.0</kPoint>
            <kPoint weight="1.0">0.0 0.0 0.0</kPoint>
         </kPointList>
      </bzIntegration>
   </calculationSetup>
</fleurInput>"#;
        let root = document::parse(xml.as_bytes()).unwrap();
        let kpts = read_kpoints(&root, &cubic(8.0)).unwrap();

        assert_eq!(kpts.len(), 2);
        assert!((kpts[0].coordinates[0] - std::f64::consts::PI / 8.0).abs() < 1e-12);
        assert!((kpts[0].weight - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_kpoints_absent() {
        let root = document::parse(SI_INPXML.as_bytes()).unwrap();
        let lattice = parse_inpxml_content(SI_INPXML.as_bytes()).unwrap().lattice.unwrap();
        assert!(read_kpoints(&root, &lattice).unwrap().is_empty());
    }
}
