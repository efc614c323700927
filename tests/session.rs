use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use junit_report::{
    CaseFailure, Config, FixtureState, FnFixture, Parametrization, Session, SuiteSpec, Target,
};

#[derive(Debug, thiserror::Error)]
#[error("'{0}'")]
struct KeyError(String);

fn session(dir: &Path) -> Session {
    Session::new(Config {
        report_dir: Some(dir.to_path_buf()),
        ..Config::default()
    })
}

fn read(dir: &Path, file: &str) -> String {
    std::fs::read_to_string(dir.join(file)).unwrap_or_else(|e| panic!("{file}: {e}"))
}

fn no_bindings() -> Parametrization {
    Parametrization::new()
}

#[test]
fn fixture_and_cases_share_one_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session
        .register_suite(SuiteSpec::new("TestClass", "test_suite"))
        .unwrap();

    session.enter_item(&key, no_bindings());
    session
        .setup_fixture(FnFixture::plain(Target::new("TestClass", "f"), |_| Ok(())))
        .unwrap();
    session
        .run_suite(&key, no_bindings(), |s| {
            s.case(Target::new("TestClass", "a"), |_| Ok(()))?;
            s.case(Target::new("TestClass", "b"), |_| Ok(()))
        })
        .unwrap();
    session.exit_item().unwrap();

    let xml = read(dir.path(), "junit_TestClass_test_suite_report.xml");
    assert!(xml.contains("tests=\"3\""));
    assert!(xml.contains("failures=\"0\""));
    assert_eq!(xml.matches("class=\"fixture\"").count(), 1);
    assert_eq!(xml.matches("class=\"function\"").count(), 2);
    assert!(session.take_errors().is_empty());
}

#[test]
fn suite_failing_before_any_case_reports_itself() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();

    let err = session
        .run_suite(&key, no_bindings(), |_| -> junit_report::CaseResult<()> {
            Err(KeyError("early".into()).into())
        })
        .unwrap_err();
    assert!(err.downcast_ref::<KeyError>().is_some());

    let xml = read(dir.path(), "junit_A_suite_report.xml");
    assert!(xml.contains("tests=\"1\""));
    assert!(xml.contains("failures=\"1\""));
    assert!(xml.contains("class=\"suite-function\""));
    assert!(xml.contains("[SUITE EXCEPTION]"));
}

#[test]
fn fixture_setup_error_propagates_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();

    session.enter_item(&key, no_bindings());
    let err = session
        .setup_fixture(FnFixture::plain(Target::new("A", "db"), |_| {
            Err::<(), _>(KeyError("x".into()).into())
        }))
        .unwrap_err();
    assert_eq!(err.kind(), "KeyError");
    assert_eq!(err.downcast_ref::<KeyError>().map(|e| e.0.as_str()), Some("x"));
    session.exit_item().unwrap();

    let xml = read(dir.path(), "junit_A_suite_report.xml");
    assert!(xml.contains("tests=\"1\""));
    assert!(xml.contains("failures=\"1\""));
    assert!(xml.contains("type=\"KeyError\""));
}

#[test]
fn teardown_only_failure_keeps_the_value() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();
    let target = Target::new("A", "conn");

    session.enter_item(&key, no_bindings());
    let value = session
        .setup_fixture(FnFixture::new(
            target.clone(),
            |_| Ok("connection"),
            |_| Err(CaseFailure::msg("ValueError", "close failed")),
        ))
        .unwrap();
    let seen = session
        .run_suite(&key, no_bindings(), |s| {
            s.case(Target::new("A", "uses_conn"), |_| Ok(value.len()))
        })
        .unwrap();
    assert_eq!(seen, "connection".len());

    let err = session.exit_item().unwrap_err();
    assert_eq!(err.kind(), "ValueError");
    assert_eq!(session.fixture_state(&target), FixtureState::Failed);

    let xml = read(dir.path(), "junit_A_suite_report.xml");
    assert!(xml.contains("tests=\"2\""));
    assert!(xml.contains("failures=\"1\""));
    assert!(xml.contains("[TEARDOWN EXCEPTION] close failed"));
    assert!(xml.contains("class=\"fixture-teardown\""));
}

#[test]
fn parametrized_permutations_write_separate_reports() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session
        .register_suite(SuiteSpec::new("A", "suite").parametrize("version", ["5.1", "6.5"]))
        .unwrap();

    for version in ["5.1", "6.5"] {
        let bindings: Parametrization = [("version", version)].into_iter().collect();
        session.enter_item(&key, bindings.clone());
        session
            .run_suite(&key, bindings, |s| {
                s.case(Target::new("A", "checks_version"), |_| Ok(()))
            })
            .unwrap();
        session.exit_item().unwrap();
    }

    for version in ["5.1", "6.5"] {
        let xml = read(dir.path(), &format!("junit_A_suite_report[{version}].xml"));
        assert!(xml.contains("tests=\"1\""), "{xml}");
        assert!(xml.contains(&format!("name=\"checks_version(version={version})\"")));
    }
}

#[test]
fn nested_cases_name_their_parent() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();

    session
        .run_suite(&key, no_bindings(), |s| {
            s.case(Target::new("A", "outer"), |s| {
                s.case(Target::new("A", "inner"), |_| Ok(()))
            })
        })
        .unwrap();

    let xml = read(dir.path(), "junit_A_suite_report.xml");
    let inner = xml.find("name=\"inner\"").expect("inner entry");
    let outer = xml.find("name=\"outer\"").expect("outer entry");
    assert!(inner < outer);
    assert!(xml.contains("classname=\"A.outer\""));
}

#[test]
fn failure_through_nested_cases_is_recorded_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();

    let err = session
        .run_suite(&key, no_bindings(), |s| {
            s.case(Target::new("A", "outer"), |s| {
                s.case(Target::new("A", "inner"), |_| -> junit_report::CaseResult<()> {
                    Err(KeyError("deep".into()).into())
                })
            })
        })
        .unwrap_err();
    assert_eq!(err.kind(), "KeyError");

    let xml = read(dir.path(), "junit_A_suite_report.xml");
    assert!(xml.contains("tests=\"2\""));
    assert!(xml.contains("failures=\"1\""));
    assert!(!xml.contains("[SUITE EXCEPTION]"));
}

#[test]
fn missing_suite_policy() {
    let mut lenient = Session::default();
    assert_eq!(lenient.case(Target::new("A", "orphan"), |_| Ok(1)).unwrap(), 1);

    let mut strict = Session::new(Config {
        fail_on_missing_suite: true,
        ..Config::default()
    });
    let err = strict
        .case(Target::new("A", "orphan"), |_| Ok(1))
        .unwrap_err();
    assert_eq!(err.kind(), "SuiteNotFoundError");

    // The body's own failure wins over the missing suite.
    let err = strict
        .case(Target::new("A", "orphan"), |_| -> junit_report::CaseResult<()> {
            Err(KeyError("body".into()).into())
        })
        .unwrap_err();
    assert_eq!(err.kind(), "KeyError");
    assert_eq!(strict.take_errors().len(), 1);
}

#[test]
fn fixtures_release_in_reverse_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));

    session.enter_item(&key, no_bindings());
    for name in ["first", "second", "third"] {
        let log = Rc::clone(&order);
        session
            .setup_fixture(FnFixture::new(Target::new("A", name), |_| Ok(()), move |_| {
                log.borrow_mut().push(name);
                Ok(())
            }))
            .unwrap();
    }
    session
        .run_suite(&key, no_bindings(), |s| {
            s.case(Target::new("A", "a"), |_| Ok(()))
        })
        .unwrap();
    assert!(!dir.path().join("junit_A_suite_report.xml").exists());

    session.exit_item().unwrap();
    assert_eq!(*order.borrow(), vec!["third", "second", "first"]);

    let xml = read(dir.path(), "junit_A_suite_report.xml");
    assert!(xml.contains("tests=\"4\""));
}

#[test]
fn case_inside_fixture_joins_the_pending_suite() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();

    session.enter_item(&key, no_bindings());
    session
        .setup_fixture(FnFixture::plain(Target::new("A", "prepared"), |s| {
            s.case(Target::new("A", "helper"), |_| Ok(()))
        }))
        .unwrap();
    session.run_suite(&key, no_bindings(), |_| Ok(())).unwrap();
    session.exit_item().unwrap();

    let xml = read(dir.path(), "junit_A_suite_report.xml");
    assert!(xml.contains("tests=\"2\""));
    assert!(xml.contains("classname=\"A.prepared\""));
}

#[test]
fn every_teardown_failure_is_reported_and_returned() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let key = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();

    session.enter_item(&key, no_bindings());
    session
        .setup_fixture(FnFixture::new(Target::new("A", "first"), |_| Ok(()), |_| {
            Err(CaseFailure::msg("ValueError", "first down"))
        }))
        .unwrap();
    session
        .setup_fixture(FnFixture::new(Target::new("A", "second"), |_| Ok(()), |_| {
            Err(CaseFailure::msg("OSError", "second down"))
        }))
        .unwrap();
    session
        .run_suite(&key, no_bindings(), |s| {
            s.case(Target::new("A", "a"), |_| Ok(()))
        })
        .unwrap();

    let err = session.exit_item().unwrap_err();
    assert_eq!(err.kind(), "OSError");
    assert_eq!(err.related().len(), 1);
    assert_eq!(err.related()[0].kind(), "ValueError");
    assert!(err.to_string().contains("first down"));

    let reports: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(reports.len(), 1);
    let xml = read(dir.path(), "junit_A_suite_report.xml");
    assert!(xml.contains("tests=\"3\""));
    assert!(xml.contains("failures=\"2\""));
    assert!(xml.contains("[TEARDOWN EXCEPTION] first down"));
    assert!(xml.contains("[TEARDOWN EXCEPTION] second down"));
}

#[test]
fn failed_setup_exports_every_suite() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path());
    let a = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();
    let b = session.register_suite(SuiteSpec::new("B", "suite")).unwrap();

    // B's export waits on its fixture, so its records are still held.
    session.enter_item(&b, no_bindings());
    session
        .setup_fixture(FnFixture::new(Target::new("B", "held"), |_| Ok(()), |_| Ok(())))
        .unwrap();
    session
        .run_suite(&b, no_bindings(), |s| {
            s.case(Target::new("B", "b"), |_| Ok(()))
        })
        .unwrap();
    assert_eq!(session.registry().get(&b).unwrap().records().len(), 2);

    session.enter_item(&a, no_bindings());
    session
        .setup_fixture(FnFixture::plain(Target::new("A", "broken"), |_| {
            Err::<(), _>(KeyError("x".into()).into())
        }))
        .unwrap_err();

    let xml = read(dir.path(), "junit_B_suite_report.xml");
    assert!(xml.contains("tests=\"2\""));
    assert!(session.registry().get(&b).unwrap().records().is_empty());
    assert!(dir.path().join("junit_A_suite_report.xml").exists());

    session.exit_item().unwrap();
    session.exit_item().unwrap();
    assert!(session.take_errors().is_empty());
}
