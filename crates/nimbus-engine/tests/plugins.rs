//! Engine plugins driven against in-memory hosts.

use std::path::Path;
use std::time::Duration;

use tokio::sync::watch;

use nimbus_core::{Cancel, Instance, InstanceState, never};
use nimbus_engine::furl::CLUSTER_FILE;
use nimbus_engine::zmq::render_profile;
use nimbus_engine::{EngineContext, EngineDispatcher, EngineError, EngineGeneration, FurlEngine, ZmqEngine};
use nimbus_engine::EngineSetupPlugin;
use nimbus_remote::{MemoryConnector, NodeRole, RemoteError, RemoteNode};

const USER: &str = "sgeadmin";
const PROFILE: &str = "/home/sgeadmin/.ipython/profile_default";

fn ctx(cache_dir: &Path, cancel: Cancel) -> EngineContext {
    EngineContext {
        cluster_name: "demo".to_string(),
        region: "us-east-1".to_string(),
        cache_dir: cache_dir.to_path_buf(),
        readiness_interval: Duration::from_millis(1),
        stop_grace: Duration::from_millis(1),
        cancel,
    }
}

fn node(connector: &MemoryConnector, n: u32, role: NodeRole) -> RemoteNode {
    let instance = Instance {
        id: format!("i-{n}"),
        image_id: "ami-w".to_string(),
        public_addr: format!("ec2-{n}.example"),
        private_addr: format!("ip-10-0-0-{n}.internal"),
        state: InstanceState::Running,
    };
    RemoteNode::connect(connector, &instance, role, "root")
}

fn cluster(connector: &MemoryConnector, size: u32) -> Vec<RemoteNode> {
    (1..=size)
        .map(|n| {
            let role = if n == 1 { NodeRole::Master } else { NodeRole::Worker };
            node(connector, n, role)
        })
        .collect()
}

#[tokio::test]
async fn dispatcher_picks_generation_from_reported_version() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    let nodes = cluster(&connector, 1);
    let dispatcher = EngineDispatcher::new(ctx(dir.path(), never()));

    connector.host("ec2-1.example").respond("import IPython", ["0.11"]);
    let plugin = dispatcher.select(&nodes[0]).await.unwrap();
    assert_eq!(plugin.generation(), EngineGeneration::Zmq);

    connector.host("ec2-1.example").respond("import IPython", ["0.10.2"]);
    let plugin = dispatcher.select(&nodes[0]).await.unwrap();
    assert_eq!(plugin.generation(), EngineGeneration::Furl);
}

#[tokio::test]
async fn dispatcher_falls_back_when_version_check_prints_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    let nodes = cluster(&connector, 1);
    let dispatcher = EngineDispatcher::new(ctx(dir.path(), never()));

    assert_eq!(dispatcher.probe_version(&nodes[0]).await.unwrap(), "");
    let plugin = dispatcher.select(&nodes[0]).await.unwrap();
    assert_eq!(plugin.generation(), EngineGeneration::Furl);
}

#[tokio::test]
async fn zmq_run_waits_for_connector_and_caches_it() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    let connector = MemoryConnector::new();
    connector.respond_all("nproc", ["2"]);
    let master_host = connector.host("ec2-1.example");
    master_host.on_command_create(
        "ipcluster start",
        &format!("{PROFILE}/security/ipcontroller-client.json"),
        "{\"url\": \"tcp://ip-10-0-0-1.internal:10101\"}",
    );

    let nodes = cluster(&connector, 3);
    let engine = ZmqEngine::new(ctx(&cache, never()));
    let message = engine.run(&nodes, &nodes[0], USER).await.unwrap();

    // 3 nodes x 2 processors, one slot left for the controller.
    let commands = master_host.command_lines();
    assert!(commands.contains(&"ipcluster start --n=5 --delay=5 --daemonize".to_string()));
    let rm = commands.iter().position(|c| c.starts_with("rm -f")).unwrap();
    let start = commands.iter().position(|c| c.starts_with("ipcluster start")).unwrap();
    assert!(rm < start);

    for name in [
        "ipcontroller_config.py",
        "ipcluster_config.py",
        "ipengine_config.py",
        "ipython_config.py",
    ] {
        let contents = master_host.file(&format!("{PROFILE}/{name}")).unwrap();
        assert!(contents.starts_with("c = get_config()\n"), "{name}");
    }
    let cluster_cfg = master_host.file(&format!("{PROFILE}/ipcluster_config.py")).unwrap();
    assert!(cluster_cfg.contains("all.q@ip-10-0-0-1.internal"));

    let local = cache.join("demo-us-east-1.json");
    let cached = std::fs::read_to_string(&local).unwrap();
    assert!(cached.contains("tcp://ip-10-0-0-1.internal:10101"));
    assert!(message.contains(&local.display().to_string()));

    let start_record = master_host
        .commands()
        .into_iter()
        .find(|r| r.command.starts_with("ipcluster start"))
        .unwrap();
    assert_eq!(start_record.user, USER);
    assert!(start_record.options.source_profile);
}

#[tokio::test]
async fn zmq_readiness_wait_is_cancellable() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    connector.respond_all("nproc", ["1"]);
    let nodes = cluster(&connector, 1);

    let (_tx, rx) = watch::channel(true);
    let engine = ZmqEngine::new(ctx(dir.path(), rx));
    let err = engine.run(&nodes, &nodes[0], USER).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert!(!dir.path().join("demo-us-east-1.json").exists());
}

#[tokio::test]
async fn zmq_readiness_wait_stops_on_unreachable_master() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    connector.respond_all("nproc", ["1"]);
    connector.host("ec2-1.example").fail_file_checks(255);
    let nodes = cluster(&connector, 1);

    let engine = ZmqEngine::new(ctx(dir.path(), never()));
    let err = engine.run(&nodes, &nodes[0], USER).await.unwrap_err();
    assert!(
        matches!(err, EngineError::Remote(RemoteError::CommandFailed { status: 255, .. })),
        "{err:?}"
    );
    assert!(!dir.path().join("demo-us-east-1.json").exists());
}

#[tokio::test]
async fn zmq_add_node_starts_engines_on_that_node() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    connector.respond_all("nproc", ["4"]);
    let nodes = cluster(&connector, 2);
    let added = node(&connector, 3, NodeRole::Worker);

    let engine = ZmqEngine::new(ctx(dir.path(), never()));
    engine.on_add_node(&added, &nodes, &nodes[0], USER).await.unwrap();

    let added_cmds = connector.host("ec2-3.example").commands();
    let start = added_cmds
        .iter()
        .find(|r| r.command == "ipcluster engines --n=4 --daemonize")
        .unwrap();
    assert_eq!(start.user, USER);
    assert!(
        connector
            .host("ec2-1.example")
            .command_lines()
            .contains(&"ipython profile create".to_string())
    );
}

#[tokio::test]
async fn zmq_remove_node_only_regenerates_config() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    let nodes = cluster(&connector, 3);

    let engine = ZmqEngine::new(ctx(dir.path(), never()));
    engine.on_remove_node(&nodes[2], &nodes, &nodes[0], USER).await.unwrap();

    assert!(connector.host("ec2-3.example").commands().is_empty());
    assert!(
        connector
            .host("ec2-1.example")
            .file(&format!("{PROFILE}/ipcontroller_config.py"))
            .is_some()
    );
}

#[tokio::test]
async fn zmq_profile_does_not_depend_on_node_set() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    connector.respond_all("nproc", ["2"]);
    let nodes = cluster(&connector, 3);
    let expected = render_profile("ip-10-0-0-1.internal", "ec2-1.example");
    let master = connector.host("ec2-1.example");

    let engine = ZmqEngine::new(ctx(dir.path(), never()));
    engine.on_add_node(&nodes[2], &nodes[..2], &nodes[0], USER).await.unwrap();
    for file in &expected {
        assert_eq!(master.file(&format!("{PROFILE}/{}", file.name)), Some(file.contents.clone()));
    }

    engine.on_remove_node(&nodes[2], &nodes, &nodes[0], USER).await.unwrap();
    for file in &expected {
        assert_eq!(master.file(&format!("{PROFILE}/{}", file.name)), Some(file.contents.clone()));
    }
}

#[tokio::test]
async fn zmq_stop_tolerates_failures_and_kills_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    let nodes = cluster(&connector, 3);
    let master_host = connector.host("ec2-1.example");
    master_host.respond_status("ipcluster stop", 1, ["no cluster running"]);
    connector.host("ec2-2.example").respond_status("pkill", 1, Vec::<String>::new());

    let engine = ZmqEngine::new(ctx(dir.path(), never()));
    engine.stop(&nodes, &nodes[0], USER).await.unwrap();
    // Second stop on an already stopped engine succeeds too.
    engine.stop(&nodes, &nodes[0], USER).await.unwrap();

    let master_cmds = master_host.command_lines();
    let graceful = master_cmds.iter().position(|c| c == "ipcluster stop").unwrap();
    let kill = master_cmds
        .iter()
        .position(|c| c == "pkill -f ipcontrollerapp.py")
        .unwrap();
    assert!(graceful < kill);
    for host in ["ec2-1.example", "ec2-2.example", "ec2-3.example"] {
        assert!(
            connector
                .host(host)
                .command_lines()
                .contains(&"pkill -f ipengineapp.py".to_string()),
            "{host}"
        );
    }
}

#[tokio::test]
async fn furl_run_writes_cluster_file_and_starts_controller() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    connector.respond_all("nproc", ["2"]);
    let nodes = cluster(&connector, 2);

    let engine = FurlEngine::new(ctx(dir.path(), never()));
    let message = engine.run(&nodes, &nodes[0], USER).await.unwrap();
    assert!(message.contains(USER));

    let master_host = connector.host("ec2-1.example");
    assert_eq!(
        master_host.file(CLUSTER_FILE).unwrap(),
        "send_furl = True\nengines = {'ip-10-0-0-1.internal': 2, 'ip-10-0-0-2.internal': 2}\n"
    );
    assert!(master_host.command_lines().contains(
        &"su - sgeadmin -c 'screen -d -m ipcluster ssh --clusterfile /etc/clusterfile.py'"
            .to_string()
    ));
}

#[tokio::test]
async fn furl_add_then_remove_restores_cluster_file() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    connector.respond_all("nproc", ["2"]);
    let nodes = cluster(&connector, 2);
    let added = node(&connector, 3, NodeRole::Worker);
    let master_host = connector.host("ec2-1.example");

    let engine = FurlEngine::new(ctx(dir.path(), never()));
    engine.run(&nodes, &nodes[0], USER).await.unwrap();
    let before = master_host.file(CLUSTER_FILE).unwrap();

    engine.on_add_node(&added, &nodes, &nodes[0], USER).await.unwrap();
    let grown = master_host.file(CLUSTER_FILE).unwrap();
    assert!(grown.contains("'ip-10-0-0-3.internal': 2"));
    let engine_starts = connector
        .host("ec2-3.example")
        .command_lines()
        .into_iter()
        .filter(|c| c.contains("ipengine --furl-file /home/sgeadmin/.ipython/security/ipcontroller-engine.furl"))
        .count();
    assert_eq!(engine_starts, 2);

    let mut current = nodes.clone();
    current.push(added.clone());
    engine.on_remove_node(&added, &current, &nodes[0], USER).await.unwrap();
    assert_eq!(master_host.file(CLUSTER_FILE).unwrap(), before);
    assert!(
        connector
            .host("ec2-3.example")
            .command_lines()
            .contains(&"pkill ipengine".to_string())
    );
}

#[tokio::test]
async fn furl_stop_uses_its_own_patterns() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    let nodes = cluster(&connector, 2);

    let engine = FurlEngine::new(ctx(dir.path(), never()));
    engine.stop(&nodes, &nodes[0], USER).await.unwrap();

    let master_cmds = connector.host("ec2-1.example").command_lines();
    assert_eq!(master_cmds[0], "pkill -INT -f 'ipcluster ssh'");
    assert!(master_cmds.contains(&"pkill -f ipcontroller".to_string()));
    assert!(
        connector
            .host("ec2-2.example")
            .command_lines()
            .contains(&"pkill -f ipengine".to_string())
    );
}
