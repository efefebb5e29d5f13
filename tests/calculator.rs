//! 使用 /bin/sh 脚本代替 inpgen 与 fleur 的计算流程测试

#![cfg(unix)]

use fleurio::calculator::{
    CalculationParameters, CalculationProfile, Calculator, CalculatorState, CancelToken,
    FLEUR_LOG, INPGEN_INPUT, INPUT_XML, OUTPUT_XML,
};
use fleurio::error::FleurError;
use fleurio::models::{Atom, Lattice, Property, Structure, HTR_TO_EV};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const INP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fleurInput fleurInputVersion="0.34">
   <calculationSetup>
      <scfLoop itmax="15" minDistance=".00001000"/>
   </calculationSetup>
   <cell>
      <bulkLattice scale="1.0">
         <bravaisMatrix>
            <row-1>0.0 5.13 5.13</row-1>
            <row-2>5.13 0.0 5.13</row-2>
            <row-3>5.13 5.13 0.0</row-3>
         </bravaisMatrix>
      </bulkLattice>
   </cell>
   <atomSpecies>
      <species name="Si-1" element="Si" atomicNumber="14"/>
   </atomSpecies>
   <atomGroups>
      <atomGroup species="Si-1">
         <relPos label="1">1/8 1/8 1/8</relPos>
         <relPos label="2">-1/8 -1/8 -1/8</relPos>
      </atomGroup>
   </atomGroups>
</fleurInput>
"#;

fn out_xml(distance: &str) -> String {
    let input = INP_XML.trim_start_matches(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<fleurOutput fleurOutputVersion="0.34">
   <programVersion version="fleur 36"/>
{input}
   <scfLoop>
      <iteration numberForCurrentRun="1" overallNumber="7">
         <FermiEnergy value="0.2" units="Htr"/>
         <totalEnergy value="-580.5" units="Htr"/>
         <densityConvergence units="me/bohr^3">
            <chargeDensity distance="{distance}"/>
         </densityConvergence>
      </iteration>
   </scfLoop>
</fleurOutput>
"#
    )
}

/// 测试用的脚本与输出文件目录
struct Stubs {
    dir: tempfile::TempDir,
}

impl Stubs {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("inp.xml"), INP_XML).unwrap();
        fs::write(dir.path().join("converged.xml"), out_xml("0.0000000005")).unwrap();
        fs::write(dir.path().join("unconverged.xml"), out_xml("0.0042")).unwrap();
        Stubs { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn script(&self, name: &str, body: &str) -> String {
        let path = self.path(name);
        fs::write(&path, body).unwrap();
        path.display().to_string()
    }

    /// inpgen 脚本：检查参数并复制 inp.xml
    fn inpgen(&self) -> String {
        let body = format!(
            "[ \"$1\" = \"-f\" ] || exit 9\n[ -f \"$2\" ] || exit 8\necho \"inpgen $@\" >> {count}\ncp {inp} inp.xml\n",
            count = self.path("inpgen.count").display(),
            inp = self.path("inp.xml").display(),
        );
        self.script("inpgen.sh", &body)
    }

    /// fleur 脚本：记录运行次数并复制给定的 out.xml
    fn fleur_copy(&self, file: &str) -> String {
        let body = format!(
            "echo run >> {count}\necho 'fleur running'\ncp {out} out.xml\n",
            count = self.path("fleur.count").display(),
            out = self.path(file).display(),
        );
        self.script("fleur.sh", &body)
    }

    fn profile(&self, fleur_script: String) -> CalculationProfile {
        CalculationProfile {
            inpgen: PathBuf::from("/bin/sh"),
            inpgen_args: vec![self.inpgen()],
            fleur: PathBuf::from("/bin/sh"),
            fleur_args: vec![fleur_script],
        }
    }

    fn fleur_runs(&self) -> usize {
        fs::read_to_string(self.path("fleur.count"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

fn silicon() -> Structure {
    let lattice = Lattice::from_vectors([[0.0, 5.13, 5.13], [5.13, 0.0, 5.13], [5.13, 5.13, 0.0]]);
    let atoms = vec![
        Atom::new("Si", lattice.to_cartesian([0.125; 3])),
        Atom::new("Si", lattice.to_cartesian([-0.125; 3])),
    ];
    Structure::bulk(atoms, lattice).unwrap()
}

fn energy_only() -> BTreeSet<Property> {
    BTreeSet::from([Property::Energy])
}

#[test]
fn test_successful_calculation() {
    let stubs = Stubs::new();
    let work = tempfile::tempdir().unwrap();
    let mut calc = Calculator::new(stubs.profile(stubs.fleur_copy("converged.xml")))
        .in_directory(work.path().join("si"));

    let result = calc.calculate(&silicon(), &energy_only(), None).unwrap();

    assert!((result.energy().unwrap() - (-580.5 * HTR_TO_EV)).abs() < 1e-6);
    assert_eq!(result.iterations, 7);
    assert_eq!(calc.state(), CalculatorState::Succeeded);
    assert_eq!(calc.outcomes().len(), 2);

    let dir = calc.directory().unwrap();
    let input = fs::read_to_string(dir.join(INPGEN_INPUT)).unwrap();
    assert!(input.to_lowercase().contains("input generator"));
    assert!(dir.join(OUTPUT_XML).exists());
    assert_eq!(
        fs::read_to_string(dir.join(FLEUR_LOG)).unwrap().trim(),
        "fleur running"
    );
}

#[test]
fn test_identical_request_uses_cache() {
    let stubs = Stubs::new();
    let mut calc = Calculator::new(stubs.profile(stubs.fleur_copy("converged.xml")));
    let structure = silicon();

    let first = calc.calculate(&structure, &energy_only(), None).unwrap();
    let second = calc.calculate(&structure, &energy_only(), None).unwrap();
    assert_eq!(first, second);
    assert_eq!(stubs.fleur_runs(), 1);

    // 不同的物理量集合需要重新计算
    let both = BTreeSet::from([Property::Energy, Property::FermiLevel]);
    let third = calc.calculate(&structure, &both, None).unwrap();
    assert!(third.fermi_level().is_some());
    assert_eq!(stubs.fleur_runs(), 2);
}

#[test]
fn test_exit_code_is_reported() {
    let stubs = Stubs::new();
    let fleur = stubs.script("fail.sh", "echo 'fatal: no inp.xml' >&2\nexit 1\n");
    let work = tempfile::tempdir().unwrap();
    let dir = work.path().join("calc");
    let mut calc = Calculator::new(stubs.profile(fleur)).in_directory(&dir);

    let err = calc.calculate(&silicon(), &energy_only(), None).unwrap_err();
    match err {
        FleurError::ProcessExitError {
            code, stderr_tail, ..
        } => {
            assert_eq!(code, Some(1));
            assert!(stderr_tail.contains("fatal: no inp.xml"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(calc.state(), CalculatorState::Failed);
    assert!(!dir.exists());
    assert!(calc.directory().is_none());
}

#[test]
fn test_keep_failed_directory() {
    let stubs = Stubs::new();
    let fleur = stubs.script("fail.sh", "exit 2\n");
    let work = tempfile::tempdir().unwrap();
    let dir = work.path().join("calc");
    let mut calc = Calculator::new(stubs.profile(fleur))
        .in_directory(&dir)
        .keep_failed(true);

    assert!(calc.calculate(&silicon(), &energy_only(), None).is_err());
    assert!(dir.join(INPUT_XML).exists());
    assert_eq!(calc.directory(), Some(dir.as_path()));
}

#[test]
fn test_truncated_output_is_parse_error() {
    let stubs = Stubs::new();
    let full = out_xml("0.0");
    fs::write(stubs.path("truncated.xml"), &full[..full.len() / 2]).unwrap();
    let mut calc = Calculator::new(stubs.profile(stubs.fleur_copy("truncated.xml")));

    let err = calc.calculate(&silicon(), &energy_only(), None).unwrap_err();
    match err {
        FleurError::ResultParseError { source } => {
            assert!(matches!(*source, FleurError::MalformedDocument { .. }))
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_missing_output_is_parse_error() {
    let stubs = Stubs::new();
    let fleur = stubs.script("noop.sh", "exit 0\n");
    let mut calc = Calculator::new(stubs.profile(fleur));

    let err = calc.calculate(&silicon(), &energy_only(), None).unwrap_err();
    assert!(matches!(err, FleurError::ResultParseError { .. }));
}

#[test]
fn test_stale_output_in_existing_directory_is_not_reused() {
    let stubs = Stubs::new();
    let work = tempfile::tempdir().unwrap();
    fs::write(work.path().join(OUTPUT_XML), out_xml("0.0")).unwrap();
    fs::write(work.path().join("notes.txt"), "keep me").unwrap();
    let fleur = stubs.script("noop.sh", "exit 0\n");
    let mut calc = Calculator::new(stubs.profile(fleur)).in_directory(work.path());

    let err = calc.calculate(&silicon(), &energy_only(), None).unwrap_err();
    match err {
        FleurError::ResultParseError { source } => {
            assert!(matches!(*source, FleurError::FileNotFound { .. }))
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(calc.state(), CalculatorState::Failed);
    assert!(!work.path().join(OUTPUT_XML).exists());
    assert!(work.path().join("notes.txt").exists());
}

#[test]
fn test_unconverged_single_run_fails() {
    let stubs = Stubs::new();
    let mut calc = Calculator::new(stubs.profile(stubs.fleur_copy("unconverged.xml")));

    let err = calc.calculate(&silicon(), &energy_only(), None).unwrap_err();
    match err {
        FleurError::ResultParseError { source } => {
            assert!(matches!(*source, FleurError::IncompleteResult { .. }))
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(stubs.fleur_runs(), 1);
}

#[test]
fn test_reruns_until_converged() {
    let stubs = Stubs::new();
    let body = format!(
        "echo run >> {count}\nif [ $(wc -l < {count}) -ge 2 ]; then cp {ok} out.xml; else cp {bad} out.xml; fi\n",
        count = stubs.path("fleur.count").display(),
        ok = stubs.path("converged.xml").display(),
        bad = stubs.path("unconverged.xml").display(),
    );
    let fleur = stubs.script("rerun.sh", &body);
    let parameters = CalculationParameters {
        max_runs: 3,
        ..Default::default()
    };
    let mut calc = Calculator::new(stubs.profile(fleur)).with_parameters(parameters);

    let result = calc.calculate(&silicon(), &energy_only(), None).unwrap();
    assert!(result.density_distance.unwrap() < 1e-6);
    assert_eq!(stubs.fleur_runs(), 2);
    assert_eq!(calc.outcomes().len(), 3);
}

#[test]
fn test_inpxml_changes_are_applied() {
    let stubs = Stubs::new();
    let parameters = CalculationParameters {
        iterations_per_run: Some(30),
        ..Default::default()
    };
    let mut calc = Calculator::new(stubs.profile(stubs.fleur_copy("converged.xml")))
        .with_parameters(parameters);

    calc.calculate(&silicon(), &energy_only(), None).unwrap();
    let inp = fs::read_to_string(calc.directory().unwrap().join(INPUT_XML)).unwrap();
    assert!(inp.contains("itmax=\"30\""));
}

#[test]
fn test_timeout_kills_process_tree() {
    let stubs = Stubs::new();
    let pid_file = stubs.path("sleep.pid");
    let fleur = stubs.script(
        "hang.sh",
        &format!("sleep 30 &\necho $! > {}\nwait\n", pid_file.display()),
    );
    let mut calc = Calculator::new(stubs.profile(fleur));

    let start = Instant::now();
    let err = calc
        .calculate(&silicon(), &energy_only(), Some(Duration::from_secs(1)))
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "unexpected error: {:?}", err);
    assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);
    assert_eq!(calc.state(), CalculatorState::Failed);

    #[cfg(target_os = "linux")]
    {
        let pid = fs::read_to_string(&pid_file).unwrap();
        let proc_dir = Path::new("/proc").join(pid.trim());
        let gone = (0..50).any(|_| {
            if !is_running(&proc_dir) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
            false
        });
        assert!(gone, "background sleep survived the timeout");
    }
}

/// 进程目录存在且不是僵尸进程
#[cfg(target_os = "linux")]
fn is_running(proc_dir: &Path) -> bool {
    match fs::read_to_string(proc_dir.join("stat")) {
        Ok(stat) => !stat
            .rsplit(')')
            .next()
            .map(|rest| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[test]
fn test_cancel_before_start_spawns_nothing() {
    let stubs = Stubs::new();
    let work = tempfile::tempdir().unwrap();
    let dir = work.path().join("calc");
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut calc = Calculator::new(stubs.profile(stubs.fleur_copy("converged.xml")))
        .in_directory(&dir)
        .with_cancel_token(cancel);

    let err = calc.calculate(&silicon(), &energy_only(), None).unwrap_err();
    assert!(err.is_cancelled());
    assert!(!dir.exists());
    assert!(!stubs.path("inpgen.count").exists());
}

#[test]
fn test_cancel_while_running() {
    let stubs = Stubs::new();
    let work = tempfile::tempdir().unwrap();
    let dir = work.path().join("calc");
    let fleur = stubs.script("hang.sh", "sleep 30\n");
    let mut calc = Calculator::new(stubs.profile(fleur)).in_directory(&dir);
    let cancel = calc.cancel_token();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        cancel.cancel();
    });
    let start = Instant::now();
    let err = calc.calculate(&silicon(), &energy_only(), None).unwrap_err();
    handle.join().unwrap();

    assert!(err.is_cancelled());
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(calc.state(), CalculatorState::Failed);
    assert!(!dir.exists());
    assert!(calc.directory().is_none());
}

#[test]
fn test_missing_executable_is_spawn_error() {
    let stubs = Stubs::new();
    let mut profile = stubs.profile(stubs.fleur_copy("converged.xml"));
    profile.inpgen = stubs.path("does-not-exist");
    let mut calc = Calculator::new(profile);

    let err = calc.calculate(&silicon(), &energy_only(), None).unwrap_err();
    assert!(matches!(err, FleurError::ProcessSpawnError { .. }));
}

#[test]
fn test_top_level_calculate() {
    let stubs = Stubs::new();
    let profile = stubs.profile(stubs.fleur_copy("converged.xml"));
    let properties = BTreeSet::from([Property::Energy, Property::FreeEnergy]);

    let result = fleurio::calculator::calculate(&silicon(), &profile, &properties, None).unwrap();
    assert_eq!(result.energy(), result.free_energy());
}
