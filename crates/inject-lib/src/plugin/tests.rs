//! Chain semantics against a scripted in-memory plugin runner

use super::*;
use crate::context::CancelSignal;
use crate::observability::StructuredLogger;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct Call {
    op: PluginOp,
    plugin_type: String,
    conf: RuntimeConf,
    stdin: Value,
}

/// Returns a canned result per plugin type and records every call
#[derive(Default)]
struct FakeExec {
    results: HashMap<String, Value>,
    failing: Option<String>,
    calls: Mutex<Vec<Call>>,
}

impl FakeExec {
    fn with_results(results: &[(&str, Value)]) -> Self {
        Self {
            results: results
                .iter()
                .map(|(t, v)| (t.to_string(), v.clone()))
                .collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn order(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.plugin_type).collect()
    }
}

#[async_trait]
impl PluginExec for FakeExec {
    async fn exec(
        &self,
        op: PluginOp,
        plugin_type: &str,
        conf: &RuntimeConf,
        stdin: Vec<u8>,
    ) -> Result<Option<Value>, ExecError> {
        self.calls.lock().unwrap().push(Call {
            op,
            plugin_type: plugin_type.to_string(),
            conf: conf.clone(),
            stdin: serde_json::from_slice(&stdin).unwrap(),
        });

        if self.failing.as_deref() == Some(plugin_type) {
            return Err(ExecError::Plugin(PluginError {
                code: 11,
                msg: "link not found".to_string(),
                details: String::new(),
            }));
        }
        match op {
            PluginOp::Add => Ok(self.results.get(plugin_type).cloned()),
            _ => Ok(None),
        }
    }
}

struct Fixture {
    cache_dir: TempDir,
    orchestrator: PluginOrchestrator<FakeExec>,
}

impl Fixture {
    fn new(exec: FakeExec) -> Self {
        let cache_dir = TempDir::new().unwrap();
        let orchestrator = PluginOrchestrator::new(exec, ResultCache::new(cache_dir.path()));
        Self {
            cache_dir,
            orchestrator,
        }
    }

    fn exec(&self) -> &FakeExec {
        &self.orchestrator.exec
    }

    fn cache(&self) -> ResultCache {
        ResultCache::new(self.cache_dir.path())
    }
}

fn ctx() -> ExecContext {
    ExecContext::new(StructuredLogger::new("ns1", "pod1"), CancelSignal::never())
}

fn conf() -> RuntimeConf {
    RuntimeConf::new("abc123", NetnsPath::from_pid(4321), "net1")
}

fn chain(version: &str) -> NetworkSpec {
    let doc = json!({
        "cniVersion": version,
        "name": "net",
        "plugins": [
            {"type": "macvlan", "master": "eth1"},
            {"type": "tuning", "mtu": 1400},
            {"type": "sbr"}
        ]
    });
    NetworkSpec::parse(doc.to_string().as_bytes()).unwrap()
}

fn result(ip: &str) -> Value {
    json!({"cniVersion": "1.0.0", "ips": [{"address": ip}]})
}

#[tokio::test]
async fn test_runtime_conf_reaches_plugin_unchanged() {
    let fixture = Fixture::new(FakeExec::with_results(&[("macvlan", result("10.0.0.2/24"))]));
    let spec = NetworkSpec::parse(br#"{"cniVersion":"1.0.0","name":"net","type":"macvlan"}"#)
        .unwrap();

    fixture
        .orchestrator
        .invoke(&ctx(), PluginOp::Add, &spec, &conf())
        .await
        .unwrap();

    let calls = fixture.exec().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].conf.container_id, "abc123");
    assert_eq!(calls[0].conf.netns.as_str(), "/proc/4321/ns/net");
    assert_eq!(calls[0].conf.if_name, "net1");
    assert_eq!(calls[0].conf.cni_args(), "");
}

#[tokio::test]
async fn test_add_threads_prev_result_in_order() {
    let fixture = Fixture::new(FakeExec::with_results(&[
        ("macvlan", result("10.0.0.2/24")),
        ("tuning", result("10.0.0.3/24")),
    ]));

    let out = fixture
        .orchestrator
        .invoke(&ctx(), PluginOp::Add, &chain("1.0.0"), &conf())
        .await
        .unwrap();

    assert_eq!(fixture.exec().order(), vec!["macvlan", "tuning", "sbr"]);

    let calls = fixture.exec().calls();
    assert!(calls[0].stdin.get("prevResult").is_none());
    assert_eq!(calls[1].stdin["prevResult"], result("10.0.0.2/24"));
    // sbr printed nothing, so the tuning result stands
    assert_eq!(calls[2].stdin["prevResult"], result("10.0.0.3/24"));
    assert_eq!(out, Some(result("10.0.0.3/24")));

    for call in &calls {
        assert_eq!(call.op, PluginOp::Add);
        assert_eq!(call.stdin["name"], "net");
        assert_eq!(call.stdin["cniVersion"], "1.0.0");
    }

    let cached = fixture.cache().load("net", &conf()).await.unwrap();
    assert_eq!(cached, Some(result("10.0.0.3/24")));
}

#[tokio::test]
async fn test_add_failure_names_plugin_and_skips_cache() {
    let fixture = Fixture::new(FakeExec {
        failing: Some("tuning".to_string()),
        ..FakeExec::with_results(&[("macvlan", result("10.0.0.2/24"))])
    });

    let err = fixture
        .orchestrator
        .invoke(&ctx(), PluginOp::Add, &chain("1.0.0"), &conf())
        .await
        .unwrap_err();

    match &err {
        InjectError::PluginInvocation { op, plugin, source } => {
            assert_eq!(*op, PluginOp::Add);
            assert_eq!(plugin, "tuning");
            assert!(source.to_string().contains("link not found"));
        }
        other => panic!("expected PluginInvocation, got {:?}", other),
    }
    assert_eq!(fixture.exec().order(), vec!["macvlan", "tuning"]);
    assert!(fixture.cache().load("net", &conf()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_del_runs_in_reverse_with_cached_result() {
    let fixture = Fixture::new(FakeExec::default());
    let spec = chain("1.0.0");
    fixture
        .cache()
        .store(&spec, &conf(), &result("10.0.0.9/24"))
        .await
        .unwrap();

    let out = fixture
        .orchestrator
        .invoke(&ctx(), PluginOp::Del, &spec, &conf())
        .await
        .unwrap();

    assert!(out.is_none());
    assert_eq!(fixture.exec().order(), vec!["sbr", "tuning", "macvlan"]);
    for call in fixture.exec().calls() {
        assert_eq!(call.op, PluginOp::Del);
        assert_eq!(call.stdin["prevResult"], result("10.0.0.9/24"));
    }
    assert!(fixture.cache().load("net", &conf()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_del_without_cache_proceeds() {
    let fixture = Fixture::new(FakeExec::default());

    fixture
        .orchestrator
        .invoke(&ctx(), PluginOp::Del, &chain("0.3.1"), &conf())
        .await
        .unwrap();

    assert_eq!(fixture.exec().calls().len(), 3);
    assert!(fixture.exec().calls()[0].stdin.get("prevResult").is_none());
}

#[tokio::test]
async fn test_check_requires_version_0_4_0() {
    let fixture = Fixture::new(FakeExec::default());

    let err = fixture
        .orchestrator
        .invoke(&ctx(), PluginOp::Check, &chain("0.3.1"), &conf())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        InjectError::PluginInvocation {
            op: PluginOp::Check,
            ..
        }
    ));
    assert!(fixture.exec().calls().is_empty());
}

#[tokio::test]
async fn test_check_skipped_when_disabled() {
    let fixture = Fixture::new(FakeExec::default());
    let spec = NetworkSpec::parse(
        br#"{"cniVersion":"1.0.0","name":"net","disableCheck":true,"plugins":[{"type":"bridge"}]}"#,
    )
    .unwrap();

    let out = fixture
        .orchestrator
        .invoke(&ctx(), PluginOp::Check, &spec, &conf())
        .await
        .unwrap();

    assert!(out.is_none());
    assert!(fixture.exec().calls().is_empty());
}

#[tokio::test]
async fn test_check_runs_in_order_with_cached_result() {
    let fixture = Fixture::new(FakeExec::default());
    let spec = chain("0.4.0");
    fixture
        .cache()
        .store(&spec, &conf(), &result("10.0.0.4/24"))
        .await
        .unwrap();

    fixture
        .orchestrator
        .invoke(&ctx(), PluginOp::Check, &spec, &conf())
        .await
        .unwrap();

    assert_eq!(fixture.exec().order(), vec!["macvlan", "tuning", "sbr"]);
    let calls = fixture.exec().calls();
    assert!(calls.iter().all(|c| c.op == PluginOp::Check));
    assert_eq!(calls[0].stdin["prevResult"], result("10.0.0.4/24"));
}

#[tokio::test]
async fn test_invoke_from_missing_file() {
    let fixture = Fixture::new(FakeExec::default());
    let dir = TempDir::new().unwrap();

    let err = fixture
        .orchestrator
        .invoke_from_file(&ctx(), PluginOp::Add, &dir.path().join("nope.conf"), &conf())
        .await
        .unwrap_err();

    assert!(matches!(err, InjectError::SpecLoad { .. }));
    assert!(fixture.exec().calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_invocation_runs_no_plugin() {
    let fixture = Fixture::new(FakeExec::default());
    let (handle, signal) = CancelSignal::new();
    handle.cancel();
    let ctx = ExecContext::new(StructuredLogger::new("ns1", "pod1"), signal);

    let err = fixture
        .orchestrator
        .invoke(&ctx, PluginOp::Add, &chain("1.0.0"), &conf())
        .await
        .unwrap_err();

    assert!(matches!(err, InjectError::Cancelled { stage: "plugin" }));
    assert!(fixture.exec().calls().is_empty());
}

#[test]
fn test_cni_args_encoding() {
    let mut conf = conf();
    conf.args = vec![
        ("K8S_POD_NAMESPACE".to_string(), "ns1".to_string()),
        ("K8S_POD_NAME".to_string(), "pod1".to_string()),
    ];
    assert_eq!(conf.cni_args(), "K8S_POD_NAMESPACE=ns1;K8S_POD_NAME=pod1");
}
