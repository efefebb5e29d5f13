//! # 元素周期表
//!
//! inpgen 文件以原子序数标记原子，内部模型以元素符号标记，需要双向查找。

const SYMBOLS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh",
    "Fl", "Mc", "Lv", "Ts", "Og",
];

/// 原子序数 → 元素符号
pub fn symbol(atomic_number: u32) -> Option<&'static str> {
    let idx = (atomic_number as usize).checked_sub(1)?;
    SYMBOLS.get(idx).copied()
}

/// 元素符号 → 原子序数（大小写不敏感）
pub fn atomic_number(symbol: &str) -> Option<u32> {
    SYMBOLS
        .iter()
        .position(|s| s.eq_ignore_ascii_case(symbol))
        .map(|i| i as u32 + 1)
}

/// 规范化元素符号大小写，如 "SI" → "Si"
pub fn normalize(symbol: &str) -> Option<&'static str> {
    atomic_number(symbol).and_then(self::symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_ways() {
        assert_eq!(symbol(14), Some("Si"));
        assert_eq!(atomic_number("Si"), Some(14));
        assert_eq!(atomic_number("na"), Some(11));
        assert_eq!(symbol(0), None);
        assert_eq!(symbol(119), None);
        assert_eq!(normalize("FE"), Some("Fe"));
        assert_eq!(atomic_number("Xx"), None);
    }
}
