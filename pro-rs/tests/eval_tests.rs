//! End-to-end evaluation of small project trees.

use std::fs;
use std::path::Path;

use pro::host;
use pro::{Config, Evaluator, OsHost, Preset, Severity};

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn evaluator(config: Config) -> Evaluator {
    Evaluator::with_host(OsHost, config)
}

const APP_PRO: &str = r#"
TEMPLATE = app
TARGET = demo
include(common.pri)

SOURCES = main.cpp
for(mod, MODULES) {
    SOURCES += src/$${mod}.cpp
    HEADERS += src/$${mod}.h
}

defineReplace(prefixed) {
    out =
    for(v, $$1): out += $$2$$v
    return($$out)
}
LIBS = $$prefixed(DEPS, -l)

debug {
    DEFINES += DEMO_DEBUG
} else {
    DEFINES += NDEBUG
}

!contains(QT, gui): CONSOLE = yes
"#;

const COMMON_PRI: &str = "MODULES = core net\nDEPS = z ssl\nQT = core\nROOT = $$PWD\n";

#[test]
fn application_tree() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app.pro", APP_PRO);
    write(dir.path(), "common.pri", COMMON_PRI);

    let mut ev = evaluator(Config::new());
    assert!(ev.evaluate(dir.path().join("app.pro")), "{:?}", ev.diagnostics());

    assert_eq!(ev.values("TARGET"), ["demo"]);
    assert_eq!(ev.values("SOURCES"), ["main.cpp", "src/core.cpp", "src/net.cpp"]);
    assert_eq!(ev.values("HEADERS"), ["src/core.h", "src/net.h"]);
    assert_eq!(ev.values("LIBS"), ["-lz", "-lssl"]);
    assert_eq!(ev.values("DEFINES"), ["NDEBUG"]);
    assert_eq!(ev.values("CONSOLE"), ["yes"]);
    assert_eq!(ev.values("ROOT"), [host::display(dir.path())]);
    assert!(ev.diagnostics().is_empty(), "{:?}", ev.diagnostics());
}

#[test]
fn presets_reach_the_project() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app.pro", APP_PRO);
    write(dir.path(), "common.pri", COMMON_PRI);

    let config = Config::new().with_preset(Preset::parse("CONFIG+=debug").unwrap());
    let mut ev = evaluator(config);
    assert!(ev.evaluate(dir.path().join("app.pro")));
    assert_eq!(ev.values("DEFINES"), ["DEMO_DEBUG"]);
    assert!(ev.test("debug"));
    assert!(!ev.test("release"));
    assert_eq!(ev.expand("join(SOURCES, \",\")"), ["main.cpp,src/core.cpp,src/net.cpp"]);
}

#[test]
fn evaluate_file_returns_variables() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib.pro", "TEMPLATE = lib\nFILE = $$_FILE_\n");
    let path = dir.path().join("lib.pro");

    let (vars, ok) = pro::evaluate_file(&path);
    assert!(ok);
    assert_eq!(vars.values("TEMPLATE"), ["lib"]);
    assert_eq!(vars.values("FILE"), [host::display(&path)]);
}

#[test]
fn missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut ev = evaluator(Config::new());
    assert!(!ev.evaluate(dir.path().join("absent.pro")));
    assert!(ev
        .diagnostics()
        .iter()
        .any(|d| d.severity == Severity::Error && d.message.starts_with("cannot read")));
}

#[test]
fn unreadable_root_names_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.pro");
    let mut ev = evaluator(Config::new());
    assert!(!ev.evaluate(&path));
    let diag = &ev.diagnostics()[0];
    assert_eq!(diag.position.file, host::display(&path));
    assert!(diag.to_string().starts_with(&host::display(&path)), "{diag}");
}

#[test]
fn latin1_project_and_cat() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), b"caf\xe9\n").unwrap();
    fs::write(
        dir.path().join("a.pro"),
        b"# Autor: M\xfcller\nX = 1\nC = $$cat(notes.txt)\n",
    )
    .unwrap();

    let mut ev = evaluator(Config::new());
    assert!(ev.evaluate(dir.path().join("a.pro")), "{:?}", ev.diagnostics());
    assert_eq!(ev.values("X"), ["1"]);
    assert_eq!(ev.values("C"), ["caf\u{e9}"]);
}

#[test]
fn parse_error_keeps_earlier_values() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "bad.pro", "A = 1\nB + = 2\nC = 3\n");
    let (vars, ok) = {
        let mut ev = evaluator(Config::new());
        let ok = ev.evaluate(dir.path().join("bad.pro"));
        (ev.into_variables(), ok)
    };
    assert!(!ok);
    assert_eq!(vars.values("A"), ["1"]);
    assert!(!vars.contains("C"));
}

#[test]
fn subdirs_with_features_and_fromfile() {
    let dir = tempfile::tempdir().unwrap();
    let features = tempfile::tempdir().unwrap();
    write(
        features.path(),
        "versioned.prf",
        "isEmpty(VERSION): VERSION = 0.0.1\nVER_MAJ = $$section(VERSION, ., 0, 0)\n",
    );
    write(dir.path(), "lib/lib.pro", "TARGET = core\nVERSION = 2.4.1\n");
    write(
        dir.path(),
        "top.pro",
        "TEMPLATE = subdirs\n\
         SUBDIRS = lib\n\
         for(sub, SUBDIRS) {\n\
             exists($$sub/$${sub}.pro): NAMES += $$fromfile($$sub/$${sub}.pro, TARGET)\n\
         }\n\
         VERSION = $$fromfile(lib/lib.pro, VERSION)\n\
         load(versioned)\n",
    );

    let config = Config::new().with_feature_path(features.path());
    let mut ev = evaluator(config);
    assert!(ev.evaluate(dir.path().join("top.pro")), "{:?}", ev.diagnostics());
    assert_eq!(ev.values("NAMES"), ["core"]);
    assert_eq!(ev.values("VERSION"), ["2.4.1"]);
    assert_eq!(ev.values("VER_MAJ"), ["2"]);

    let included = ev.values("QMAKE_INTERNAL_INCLUDED_FILES");
    assert!(included.contains(&host::display(&dir.path().join("lib/lib.pro"))));
    assert!(included.contains(&host::display(&features.path().join("versioned.prf"))));
}

#[test]
fn requirements_and_messages() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "req.pro",
        "CONFIG += qt\nREQUIRES = qt opengl\nTARGET = x\nmessage(building $$TARGET)\n",
    );
    let mut ev = evaluator(Config::new());
    ev.evaluate(dir.path().join("req.pro"));
    assert_eq!(ev.values("QMAKE_FAILED_REQUIREMENTS"), ["opengl"]);
    assert_eq!(ev.take_output(), vec!["Project MESSAGE: building x"]);
}
