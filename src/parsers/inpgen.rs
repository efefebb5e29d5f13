//! # FLEUR inpgen 输入格式解析器
//!
//! 解析和生成 FLEUR 输入生成器 (inpgen) 的文本输入文件。
//!
//! ## inpgen 格式说明
//! ```text
//! Si bulk (inpgen)                # 标题行，自动识别依赖 "inpgen" 或 "input generator"
//! &input cartesian=F /            # 可选 namelist，cartesian=T 表示绝对坐标
//!    0.0  5.13  5.13              # 晶格向量 a
//!    5.13 0.0   5.13              # 晶格向量 b
//!    5.13 5.13  0.0               # 晶格向量 c
//!    1.0                          # 全局缩放因子 aa
//!    1.0  1.0   1.0               # 各方向缩放（负值 x 表示 sqrt(|x|)）
//!
//!    2                            # 原子数（可选）
//!    14.1  0.125  0.125  0.125    # 原子序数或元素符号[.编号] + 坐标
//!    14.1 -0.125 -0.125 -0.125
//! &comp kmax=3.5 /                # 其余 namelist 不影响结构
//! ```
//! 也接受缩放因子在晶格向量之前的简化写法。
//! `!` 之后为注释。所有长度单位为 bohr。
//!
//! 写出时只保留晶格、元素与坐标；弛豫约束等结构之外的信息会被丢弃。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 和 `calculator/` 使用
//! - 使用 `models/structure.rs`, `models/elements.rs`

use crate::error::{FleurError, Result};
use crate::models::{elements, Atom, Lattice, Structure};
use std::fs;
use std::path::Path;

/// 标题中用于格式识别的标记（小写）
pub const TITLE_MARKERS: [&str; 2] = ["inpgen", "input generator"];

/// 未指定标题时的默认标题
pub const DEFAULT_TITLE: &str = "FLEUR input generator input written by fleurio";

/// 合法的 namelist 名称
const NAMELISTS: [&str; 11] = [
    "input", "lattice", "atom", "comp", "exco", "film", "kpt", "soc", "qss", "gen", "end",
];

/// 写出 inpgen 文件的附加选项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InpgenOptions {
    /// 标题行；缺少识别标记时自动追加 " (inpgen)"
    pub title: Option<String>,

    /// 追加在原子块之后的 namelist，如 `&comp kmax=3.5 /`
    pub namelists: Vec<String>,
}

/// 解析 inpgen 文件
pub fn parse_inpgen_file(path: &Path) -> Result<Structure> {
    let content = fs::read_to_string(path).map_err(|e| FleurError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_inpgen_content(&content)
}

/// 预处理后的一行：原始行号 + 去注释内容
struct Line<'a> {
    number: usize,
    text: &'a str,
}

impl Line<'_> {
    fn fields(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    fn syntax_error(&self, reason: impl Into<String>) -> FleurError {
        FleurError::InvalidSyntax {
            line: self.number,
            reason: reason.into(),
        }
    }
}

/// `&input` 中影响结构的开关
#[derive(Debug, Default)]
struct InputFlags {
    cartesian: bool,
    film: bool,
}

/// 从字符串内容解析 inpgen 格式
pub fn parse_inpgen_content(content: &str) -> Result<Structure> {
    let mut flags = InputFlags::default();
    let mut lines: Vec<Line> = Vec::new();

    // 第一行是标题，其余行去掉注释和空行，并展开 namelist
    let mut raw = content.lines().enumerate().skip(1).peekable();
    while let Some((idx, text)) = raw.next() {
        let number = idx + 1;
        let text = strip_comment(text).trim();
        if text.is_empty() {
            continue;
        }

        if let Some(body) = text.strip_prefix('&') {
            // namelist 可跨行，直到遇到 '/'
            let mut namelist = body.to_string();
            while !namelist.contains('/') {
                match raw.next() {
                    Some((_, more)) => {
                        namelist.push(' ');
                        namelist.push_str(strip_comment(more).trim());
                    }
                    None => {
                        return Err(FleurError::InvalidSyntax {
                            line: number,
                            reason: "namelist is not terminated by '/'".to_string(),
                        })
                    }
                }
            }
            let name = parse_namelist(&namelist, number, &mut flags)?;
            if name == "end" {
                break;
            }
            continue;
        }

        lines.push(Line { number, text });
    }

    let mut cursor = lines.iter().peekable();
    let last_line = content.lines().count();
    let eof = |reason: &str| FleurError::InvalidSyntax {
        line: last_line,
        reason: reason.to_string(),
    };

    // ── 晶格 ──────────────────────────────────────────────────
    let first = cursor.next().ok_or_else(|| eof("missing lattice vectors"))?;

    let (vectors, factor, scale) = if first.fields().len() == 1 {
        // 简化写法：缩放因子在前
        let factor = parse_number(first, first.fields()[0])?;
        let mut vectors = [[0.0; 3]; 3];
        for row in vectors.iter_mut() {
            let line = cursor
                .next()
                .ok_or_else(|| eof("expected 3 lattice vectors"))?;
            *row = parse_vector(line)?;
        }
        (vectors, factor, [1.0; 3])
    } else {
        let mut vectors = [[0.0; 3]; 3];
        vectors[0] = parse_vector(first)?;
        for row in vectors.iter_mut().skip(1) {
            let line = cursor
                .next()
                .ok_or_else(|| eof("expected 3 lattice vectors"))?;
            *row = parse_vector(line)?;
        }

        // 单独一行的数：后面紧跟原子行时是原子数，否则是 aa
        let mut factor = 1.0;
        let mut scale = [1.0; 3];
        if let Some(line) = cursor.peek().copied() {
            let followed_by_atom = lines
                .iter()
                .find(|l| l.number > line.number)
                .map(|l| l.fields().len() >= 4)
                .unwrap_or(true);
            if line.fields().len() == 1 && !followed_by_atom {
                factor = parse_number(line, line.fields()[0])?;
                cursor.next();
            }
        }
        if let Some(line) = cursor.peek().copied() {
            if line.fields().len() == 3 {
                let v = parse_vector(line)?;
                scale = v.map(|x| if x < 0.0 { x.abs().sqrt() } else { x });
                cursor.next();
            }
        }
        (vectors, factor, scale)
    };

    let lattice = Lattice::from_vectors(vectors).scaled(scale.map(|s| s * factor));
    if lattice.is_degenerate() {
        return Err(FleurError::InvalidStructure(
            "lattice vectors are linearly dependent".to_string(),
        ));
    }

    // ── 原子 ──────────────────────────────────────────────────
    let mut declared: Option<(usize, usize)> = None;
    if let Some(line) = cursor.peek().copied() {
        if line.fields().len() == 1 {
            let n: usize = line.fields()[0]
                .parse()
                .map_err(|_| line.syntax_error("atom count must be a positive integer"))?;
            declared = Some((n, line.number));
            cursor.next();
        }
    }

    let position_scale = scale.map(|s| s * factor);
    let mut atoms = Vec::new();
    for line in cursor {
        atoms.push(parse_atom_line(line, &lattice, &flags, position_scale)?);
    }

    if atoms.is_empty() {
        return Err(eof("no atoms found"));
    }
    if let Some((n, number)) = declared {
        if n != atoms.len() {
            return Err(FleurError::InvalidSyntax {
                line: number,
                reason: format!("declared {} atoms but found {}", n, atoms.len()),
            });
        }
    }

    let pbc = if flags.film {
        [true, true, false]
    } else {
        [true; 3]
    };
    Structure::new(atoms, Some(lattice), pbc)
}

fn strip_comment(line: &str) -> &str {
    match line.find('!') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// 解析 namelist 内容（不含前导 `&`），返回其名称
fn parse_namelist(body: &str, number: usize, flags: &mut InputFlags) -> Result<String> {
    let body = body
        .split('/')
        .next()
        .unwrap_or("")
        .replace(" =", "=")
        .replace("= ", "=");
    let mut parts = body.split_whitespace();
    let name = parts.next().unwrap_or("").to_lowercase();

    if !NAMELISTS.contains(&name.as_str()) {
        return Err(FleurError::InvalidSyntax {
            line: number,
            reason: format!("unknown namelist '&{}'", name),
        });
    }

    if name == "input" {
        for part in parts {
            let (key, value) = part.split_once('=').ok_or_else(|| FleurError::InvalidSyntax {
                line: number,
                reason: format!("expected key=value in &input, found '{}'", part),
            })?;
            let value = parse_logical(value).ok_or_else(|| FleurError::InvalidSyntax {
                line: number,
                reason: format!("invalid logical value '{}'", value),
            });
            match key.to_lowercase().as_str() {
                "cartesian" => flags.cartesian = value?,
                "film" => flags.film = value?,
                // 其余开关不影响结构
                _ => {}
            }
        }
    }

    Ok(name)
}

fn parse_logical(value: &str) -> Option<bool> {
    match value.trim_matches('.').to_lowercase().as_str() {
        "t" | "true" => Some(true),
        "f" | "false" => Some(false),
        _ => None,
    }
}

fn parse_number(line: &Line, field: &str) -> Result<f64> {
    field
        .parse::<f64>()
        .map_err(|_| line.syntax_error(format!("invalid number '{}'", field)))
}

fn parse_vector(line: &Line) -> Result<[f64; 3]> {
    let fields = line.fields();
    if fields.len() != 3 {
        return Err(line.syntax_error(format!(
            "expected 3 numbers, found {} fields",
            fields.len()
        )));
    }
    Ok([
        parse_number(line, fields[0])?,
        parse_number(line, fields[1])?,
        parse_number(line, fields[2])?,
    ])
}

/// 解析原子行：`Z[.tag] x y z [label]` 或 `Symbol[.tag] x y z [label]`
fn parse_atom_line(
    line: &Line,
    lattice: &Lattice,
    flags: &InputFlags,
    scale: [f64; 3],
) -> Result<Atom> {
    let fields = line.fields();
    if fields.len() < 4 || fields.len() > 5 {
        return Err(line.syntax_error("expected 'species x y z' atom line"));
    }

    let (species, tag) = match fields[0].split_once('.') {
        Some((s, t)) => {
            let tag = t
                .parse::<u32>()
                .map_err(|_| line.syntax_error(format!("invalid species tag '{}'", fields[0])))?;
            (s, Some(tag))
        }
        None => (fields[0], None),
    };

    let element = match species.parse::<u32>() {
        Ok(z) => elements::symbol(z),
        Err(_) => elements::normalize(species),
    }
    .ok_or_else(|| line.syntax_error(format!("unknown element '{}'", species)))?;

    let coords = [
        parse_number(line, fields[1])?,
        parse_number(line, fields[2])?,
        parse_number(line, fields[3])?,
    ];

    let position = if flags.cartesian {
        [
            coords[0] * scale[0],
            coords[1] * scale[1],
            coords[2] * scale[2],
        ]
    } else if flags.film {
        // 薄膜：x, y 为分数坐标，z 为绝对坐标
        let mut cart = lattice.to_cartesian([coords[0], coords[1], 0.0]);
        cart[2] += coords[2] * scale[2];
        cart
    } else {
        lattice.to_cartesian(coords)
    };

    let mut atom = Atom::new(element, position);
    atom.tag = tag;
    Ok(atom)
}

/// 补全标题中的识别标记
pub fn normalize_title(title: Option<&str>) -> String {
    match title {
        None => DEFAULT_TITLE.to_string(),
        Some(t) => {
            let t = t.lines().next().unwrap_or("").trim();
            if has_title_marker(t) {
                t.to_string()
            } else {
                tracing::warn!(
                    title = t,
                    "inpgen title must contain 'inpgen' or 'input generator', appending marker"
                );
                format!("{} (inpgen)", t).trim_start().to_string()
            }
        }
    }
}

/// 标题是否包含识别标记（大小写不敏感）
pub fn has_title_marker(line: &str) -> bool {
    let lower = line.to_lowercase();
    TITLE_MARKERS.iter().any(|m| lower.contains(m))
}

/// 将结构转换为 inpgen 格式字符串
pub fn to_inpgen_string(structure: &Structure, options: &InpgenOptions) -> Result<String> {
    let lattice = structure.lattice.as_ref().ok_or_else(|| {
        FleurError::InvalidStructure("inpgen input requires a lattice".to_string())
    })?;
    if structure.is_empty() {
        return Err(FleurError::InvalidStructure(
            "structure has no atoms".to_string(),
        ));
    }

    let film = structure.is_film();
    if !film && structure.pbc != [true; 3] {
        return Err(FleurError::InvalidStructure(format!(
            "inpgen supports bulk or film (T, T, F) periodicity, got {:?}",
            structure.pbc
        )));
    }

    let mut result = String::new();

    // 标题
    result.push_str(&normalize_title(options.title.as_deref()));
    result.push('\n');

    // 坐标模式
    if film {
        result.push_str("&input cartesian=F film=T /\n");
    } else {
        result.push_str("&input cartesian=F /\n");
    }

    // 晶格
    for row in &lattice.matrix {
        result.push_str(&format!(
            "  {:16.10}  {:16.10}  {:16.10}\n",
            row[0], row[1], row[2]
        ));
    }
    result.push_str(&format!("  {:16.10}\n", 1.0));
    result.push_str(&format!(
        "  {:16.10}  {:16.10}  {:16.10}\n\n",
        1.0, 1.0, 1.0
    ));

    // 原子
    result.push_str(&format!("  {}\n", structure.len()));
    for atom in &structure.atoms {
        let z = elements::atomic_number(&atom.element).ok_or_else(|| {
            FleurError::InvalidStructure(format!("unknown element '{}'", atom.element))
        })?;
        let species = match atom.tag {
            Some(tag) => format!("{}.{}", z, tag),
            None => z.to_string(),
        };

        let mut frac = lattice.to_fractional(atom.position)?;
        if film {
            frac[2] = atom.position[2];
        }
        result.push_str(&format!(
            "  {:<6}  {:16.10}  {:16.10}  {:16.10}\n",
            species, frac[0], frac[1], frac[2]
        ));
    }

    for namelist in &options.namelists {
        let namelist = namelist.trim();
        if !namelist.is_empty() {
            result.push_str(namelist);
            result.push('\n');
        }
    }

    Ok(result)
}

/// 写出 inpgen 文件
pub fn write_inpgen(path: &Path, structure: &Structure, options: &InpgenOptions) -> Result<()> {
    let content = to_inpgen_string(structure, options)?;
    fs::write(path, content).map_err(|e| FleurError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn si_bulk() -> Structure {
        let lattice = Lattice::from_vectors([
            [0.0, 5.13060853, 5.13060853],
            [5.13060853, 0.0, 5.13060853],
            [5.13060853, 5.13060853, 0.0],
        ]);
        let atoms = vec![
            Atom::new("Si", lattice.to_cartesian([0.125, 0.125, 0.125])),
            Atom::new("Si", lattice.to_cartesian([-0.125, -0.125, -0.125])),
        ];
        Structure::bulk(atoms, lattice).unwrap()
    }

    #[test]
    fn test_parse_scale_first_layout() {
        let content = "# inpgen test\n1.0\n5.0 0.0 0.0\n0.0 5.0 0.0\n0.0 0.0 5.0\nNa 0.0 0.0 0.0\n";
        let s = parse_inpgen_content(content).unwrap();

        assert_eq!(s.len(), 1);
        assert_eq!(s.atoms[0].element, "Na");
        assert_eq!(s.atoms[0].position, [0.0, 0.0, 0.0]);
        let (a, b, c, alpha, _, _) = s.lattice.unwrap().parameters();
        assert!((a - 5.0).abs() < 1e-9 && (b - 5.0).abs() < 1e-9 && (c - 5.0).abs() < 1e-9);
        assert!((alpha - 90.0).abs() < 1e-9);
        assert_eq!(s.pbc, [true; 3]);
    }

    #[test]
    fn test_parse_native_layout() {
        let content = r#"Si bulk (inpgen)
&input cartesian=F /
   0.000000000   5.130608533   5.130608533
   5.130608533   0.000000000   5.130608533
   5.130608533   5.130608533   0.000000000
   1.0000000000
   1.000000000   1.000000000   1.000000000

      2
         14.1   0.1250000000   0.1250000000   0.1250000000
         14.1  -0.1250000000  -0.1250000000  -0.1250000000
&comp kmax=3.5 /
"#;
        let s = parse_inpgen_content(content).unwrap();
        assert_eq!(s.symbols(), vec!["Si", "Si"]);
        assert_eq!(s.atoms[0].tag, Some(1));
        assert!((s.atoms[0].position[0] - 1.28265213).abs() < 1e-6);
        assert!((s.atoms[1].position[2] + 1.28265213).abs() < 1e-6);
    }

    #[test]
    fn test_parse_scaling_factors() {
        let content = "lattice scaling (inpgen)\n\
1.0 0.0 0.0\n0.0 1.0 0.0\n0.0 0.0 1.0\n\
2.0\n\
1.0 1.0 -4.0\n\
1\n\
Fe 0.5 0.5 0.5\n";
        let s = parse_inpgen_content(content).unwrap();
        let m = s.lattice.unwrap().matrix;
        assert!((m[0][0] - 2.0).abs() < 1e-12);
        assert!((m[2][2] - 4.0).abs() < 1e-12);
        assert!((s.atoms[0].position[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_cartesian_mode() {
        let content = "cartesian (inpgen)\n&input cartesian=t /\n\
4.0 0.0 0.0\n0.0 4.0 0.0\n0.0 0.0 4.0\n\
Fe 1.0 2.0 3.0 ! comment\n";
        let s = parse_inpgen_content(content).unwrap();
        assert_eq!(s.atoms[0].position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_parse_film_mode() {
        let content = "film (inpgen)\n&input film=T /\n\
5.0 0.0 0.0\n0.0 5.0 0.0\n0.0 0.0 20.0\n\
Fe 0.5 0.5 1.5\n";
        let s = parse_inpgen_content(content).unwrap();
        assert!(s.is_film());
        let p = s.atoms[0].position;
        assert!((p[0] - 2.5).abs() < 1e-12 && (p[2] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_count_mismatch_reports_line() {
        let content = "t (inpgen)\n1.0 0 0\n0 1.0 0\n0 0 1.0\n1.0\n1 1 1\n3\n14 0 0 0\n";
        let err = parse_inpgen_content(content).unwrap_err();
        assert!(matches!(err, FleurError::InvalidSyntax { line: 7, .. }));
    }

    #[test]
    fn test_malformed_atom_line() {
        let content = "t (inpgen)\n1.0\n5 0 0\n0 5 0\n0 0 5\nNa 0.0 zero 0.0\n";
        let err = parse_inpgen_content(content).unwrap_err();
        assert!(matches!(err, FleurError::InvalidSyntax { line: 6, .. }));
    }

    #[test]
    fn test_unknown_namelist() {
        let content = "t (inpgen)\n&bogus x=1 /\n1.0\n5 0 0\n0 5 0\n0 0 5\nNa 0 0 0\n";
        let err = parse_inpgen_content(content).unwrap_err();
        assert!(matches!(err, FleurError::InvalidSyntax { line: 2, .. }));
    }

    #[test]
    fn test_unknown_element() {
        let content = "t (inpgen)\n1.0\n5 0 0\n0 5 0\n0 0 5\nXx 0 0 0\n";
        assert!(parse_inpgen_content(content).is_err());
    }

    #[test]
    fn test_round_trip() {
        let original = si_bulk();
        let text = to_inpgen_string(&original, &InpgenOptions::default()).unwrap();
        let parsed = parse_inpgen_content(&text).unwrap();

        assert_eq!(parsed.len(), original.len());
        assert_eq!(parsed.symbols(), original.symbols());
        for (a, b) in parsed.atoms.iter().zip(&original.atoms) {
            for i in 0..3 {
                assert!((a.position[i] - b.position[i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_film_round_trip() {
        let lattice = Lattice::from_vectors([[5.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 30.0]]);
        let atoms = vec![
            Atom::new("Fe", [0.0, 0.0, -1.2]),
            Atom::new("Pt", [2.5, 2.5, 1.3]).with_tag(2),
        ];
        let original = Structure::new(atoms, Some(lattice), [true, true, false]).unwrap();
        let text = to_inpgen_string(&original, &InpgenOptions::default()).unwrap();
        assert!(text.contains("film=T"));

        let parsed = parse_inpgen_content(&text).unwrap();
        assert!(parsed.is_film());
        assert_eq!(parsed.atoms[1].tag, Some(2));
        for (a, b) in parsed.atoms.iter().zip(&original.atoms) {
            for i in 0..3 {
                assert!((a.position[i] - b.position[i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_write_is_idempotent() {
        let s = si_bulk();
        let options = InpgenOptions {
            title: Some("Si".to_string()),
            namelists: vec!["&comp kmax=3.5 /".to_string()],
        };
        let first = to_inpgen_string(&s, &options).unwrap();
        let second = to_inpgen_string(&s, &options).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("Si (inpgen)\n"));
        assert!(first.trim_end().ends_with("&comp kmax=3.5 /"));
    }

    #[test]
    fn test_write_drops_relax_flags() {
        let mut s = si_bulk();
        s.atoms[0].relax = Some([false, false, true]);
        let parsed =
            parse_inpgen_content(&to_inpgen_string(&s, &InpgenOptions::default()).unwrap())
                .unwrap();
        assert_eq!(parsed.atoms[0].relax, None);
    }

    #[test]
    fn test_write_requires_lattice() {
        let s = Structure::molecule(vec![Atom::new("H", [0.0; 3])]);
        let err = to_inpgen_string(&s, &InpgenOptions::default()).unwrap_err();
        assert!(matches!(err, FleurError::InvalidStructure(_)));
    }

    #[test]
    fn test_title_markers() {
        assert_eq!(normalize_title(Some("Input Generator run")), "Input Generator run");
        assert_eq!(normalize_title(Some("Ti bulk")), "Ti bulk (inpgen)");
        assert!(has_title_marker(&normalize_title(None)));
    }
}
