// tests/incremental_build.rs

mod common;
use crate::common::builders::TaskBuilder;
use crate::common::Fixture;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use taskforge::dag::BuildGraph;
use taskforge::engine::{Outcome, PlanAction};
use taskforge::env::MapEnv;
use taskforge::errors::TaskforgeError;
use taskforge::stale::StaleReason;
use taskforge::types::{TaskId, TaskKey};

type TestResult = Result<(), Box<dyn Error>>;

fn reason_of(report: &taskforge::engine::ExecutionReport, id: TaskId) -> Option<StaleReason> {
    report.get(id).and_then(|r| r.reason.clone())
}

fn is_ran(outcome: Option<&Outcome>) -> bool {
    matches!(outcome, Some(Outcome::Ran { .. }))
}

/// `out.bin` + `out.d` compiled from `src.c`; the command writes a
/// dependency-list file naming `header.h`.
fn compile_graph() -> Result<(BuildGraph, TaskId), Box<dyn Error>> {
    let mut graph = BuildGraph::new();
    let id = graph.add_task(
        TaskBuilder::new(&["out.bin", "out.d"])
            .input("src.c")
            .cmd(&["cc", "-MMD", "-MF", "out.d", "-o", "out.bin", "src.c"])
            .build(),
    )?;
    Ok((graph, id))
}

#[tokio::test]
async fn ran_then_fresh_then_ran_after_edit() -> TestResult {
    let fx = Fixture::new();
    fx.file("src.c", "int main() {}").file("header.h", "#define A 1");
    fx.script.write("out.d", "out.bin: src.c header.h\n");

    let (graph, t1) = compile_graph()?;
    let mut build = fx.build(graph);

    let report = fx.build_all(&mut build).await?;
    assert!(is_ran(report.outcome(t1)));
    assert_eq!(reason_of(&report, t1), Some(StaleReason::NoRecord));

    let report = fx.build_all(&mut build).await?;
    assert_eq!(report.outcome(t1), Some(&Outcome::Fresh));
    assert!(report.dispatch_order().is_empty());

    fx.file("src.c", "int main() { return 2; }");
    let report = fx.build_all(&mut build).await?;
    assert!(is_ran(report.outcome(t1)));
    assert_eq!(
        reason_of(&report, t1),
        Some(StaleReason::InputChanged(PathBuf::from("src.c")))
    );

    assert_eq!(fx.script.executed(), vec!["out.bin", "out.bin"]);
    Ok(())
}

#[tokio::test]
async fn editing_a_discovered_header_reruns_the_task() -> TestResult {
    let fx = Fixture::new();
    fx.file("src.c", "int main() {}").file("header.h", "#define A 1");
    fx.script.write("out.d", "out.bin: src.c header.h\n");

    let (graph, t1) = compile_graph()?;
    let mut build = fx.build(graph);

    fx.build_all(&mut build).await?;
    assert_eq!(
        build.graph().task(t1).map(|n| n.dynamic_inputs.contains(&PathBuf::from("header.h"))),
        Some(true)
    );

    fx.file("header.h", "#define A 2");
    let report = fx.build_all(&mut build).await?;

    assert!(is_ran(report.outcome(t1)));
    assert_eq!(
        reason_of(&report, t1),
        Some(StaleReason::InputChanged(PathBuf::from("header.h")))
    );
    Ok(())
}

#[tokio::test]
async fn dropped_include_is_forgotten_after_reingestion() -> TestResult {
    let fx = Fixture::new();
    fx.file("src.c", "int main() {}").file("header.h", "#define A 1");
    fx.script.write("out.d", "out.bin: src.c header.h\n");

    let (graph, t1) = compile_graph()?;
    let mut build = fx.build(graph);
    fx.build_all(&mut build).await?;

    // The include disappears: the next compile writes a shorter list.
    fx.file("src.c", "int main() { return 0; }");
    fx.script.write("out.d", "out.bin: src.c\n");
    let report = fx.build_all(&mut build).await?;
    assert!(is_ran(report.outcome(t1)));

    // Editing the former header no longer matters.
    fx.file("header.h", "#define A 3");
    let report = fx.build_all(&mut build).await?;
    assert_eq!(report.outcome(t1), Some(&Outcome::Fresh));
    Ok(())
}

#[tokio::test]
async fn rebuilt_input_propagates_to_consumers() -> TestResult {
    let fx = Fixture::new();
    fx.file("a.c", "a");

    let mut graph = BuildGraph::new();
    let compile = graph.add_task(TaskBuilder::new(&["a.o"]).input("a.c").build())?;
    let link = graph.add_task(TaskBuilder::new(&["app"]).input("a.o").build())?;
    let docs = graph.add_task(TaskBuilder::new(&["docs.html"]).build())?;
    let mut build = fx.build(graph);

    let report = fx.build_all(&mut build).await?;
    assert_eq!(report.ran(), vec![compile, link, docs]);

    fx.file("a.c", "a2");
    let report = fx.build_all(&mut build).await?;

    assert_eq!(report.ran(), vec![compile, link]);
    assert_eq!(report.fresh(), vec![docs]);
    assert_eq!(
        reason_of(&report, link),
        Some(StaleReason::InputRebuilt(PathBuf::from("a.o")))
    );
    assert_eq!(report.dispatch_order(), &[compile, link]);
    Ok(())
}

#[tokio::test]
async fn deleted_output_is_rebuilt() -> TestResult {
    let fx = Fixture::new();
    fx.file("a.c", "a");

    let mut graph = BuildGraph::new();
    let compile = graph.add_task(TaskBuilder::new(&["a.o"]).input("a.c").build())?;
    let mut build = fx.build(graph);
    fx.build_all(&mut build).await?;

    fx.fs.remove("a.o");
    let report = fx.build_all(&mut build).await?;

    assert_eq!(
        reason_of(&report, compile),
        Some(StaleReason::OutputMissing(PathBuf::from("a.o")))
    );
    assert!(fx.fs.contents("a.o").is_some());
    Ok(())
}

#[tokio::test]
async fn env_change_reruns_only_the_dependent_task() -> TestResult {
    let fx = Fixture::new();

    let mut graph = BuildGraph::new();
    let uses_cc = graph.add_task(TaskBuilder::new(&["a.o"]).env_inherit("CC").build())?;
    let plain = graph.add_task(TaskBuilder::new(&["b.o"]).build())?;

    let mut build = fx
        .build(graph)
        .with_env(Arc::new(MapEnv::new().with("CC", "gcc")));
    fx.build_all(&mut build).await?;

    let mut build = build.with_env(Arc::new(MapEnv::new().with("CC", "clang")));
    let report = fx.build_all(&mut build).await?;

    assert_eq!(report.ran(), vec![uses_cc]);
    assert_eq!(report.fresh(), vec![plain]);
    assert_eq!(
        reason_of(&report, uses_cc),
        Some(StaleReason::EnvChanged("CC".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn rerun_propagates_through_depends_on() -> TestResult {
    let fx = Fixture::new();

    let mut graph = BuildGraph::new();
    let toolchain = graph.add_task(TaskBuilder::new(&["toolchain.stamp"]).env_inherit("CC").build())?;
    let lib = graph.add_task(TaskBuilder::new(&["lib.a"]).depends_on(toolchain).build())?;
    let app = graph.add_task(TaskBuilder::new(&["app"]).input("lib.a").build())?;
    let unrelated = graph.add_task(TaskBuilder::new(&["docs.html"]).build())?;

    let mut build = fx
        .build(graph)
        .with_env(Arc::new(MapEnv::new().with("CC", "gcc")));
    fx.build_all(&mut build).await?;

    let report = fx.build_all(&mut build).await?;
    assert_eq!(report.fresh(), vec![toolchain, lib, app, unrelated]);

    let mut build = build.with_env(Arc::new(MapEnv::new().with("CC", "clang")));
    let report = fx.build_all(&mut build).await?;

    assert_eq!(report.ran(), vec![toolchain, lib, app]);
    assert_eq!(report.fresh(), vec![unrelated]);
    assert_eq!(
        reason_of(&report, lib),
        Some(StaleReason::DependencyRebuilt(PathBuf::from("toolchain.stamp")))
    );
    assert_eq!(
        reason_of(&report, app),
        Some(StaleReason::InputRebuilt(PathBuf::from("lib.a")))
    );
    Ok(())
}

#[tokio::test]
async fn build_target_runs_only_its_data_closure() -> TestResult {
    let fx = Fixture::new();
    fx.file("a.c", "a").file("b.c", "b");

    let mut graph = BuildGraph::new();
    let a = graph.add_task(TaskBuilder::new(&["a.o"]).input("a.c").build())?;
    let b = graph.add_task(TaskBuilder::new(&["b.o"]).input("b.c").build())?;
    let lint = graph.add_task(TaskBuilder::new(&["lint.log"]).build())?;
    let app = graph.add_task(
        TaskBuilder::new(&["app"])
            .input("a.o")
            .not_before(lint)
            .build(),
    )?;
    let mut build = fx.build(graph);

    let report = fx.build_target(&mut build, "app").await?;

    assert_eq!(report.ran(), vec![a, app]);
    assert!(report.get(b).is_none());
    assert!(report.get(lint).is_none());

    let err = fx.build_target(&mut build, "nothing.o").await.unwrap_err();
    assert!(matches!(err, TaskforgeError::TaskNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn discovered_generated_header_pulls_its_producer_into_the_run() -> TestResult {
    let fx = Fixture::new();
    fx.file("main.c", "#include \"gen.h\"");
    fx.script.write("main.d", "main.o: main.c gen.h\n");

    let mut graph = BuildGraph::new();
    let gen_header = graph.add_task(TaskBuilder::new(&["gen.h"]).build())?;
    let main = graph.add_task(TaskBuilder::new(&["main.o", "main.d"]).input("main.c").build())?;
    let mut build = fx.build(graph);

    // Build gen.h once on its own, then main.o, which discovers gen.h.
    fx.build_target(&mut build, "gen.h").await?;
    fx.build_target(&mut build, "main.o").await?;
    assert!(build.graph().predecessors(main).contains(&gen_header));

    // gen.h is now in main.o's closure; deleting it forces both to run.
    fx.fs.remove("gen.h");
    let report = fx.build_target(&mut build, "main.o").await?;
    assert_eq!(report.ran(), vec![gen_header, main]);
    assert_eq!(report.dispatch_order(), &[gen_header, main]);
    Ok(())
}

#[tokio::test]
async fn generated_rule_file_gates_a_downstream_task() -> TestResult {
    let fx = Fixture::new();
    fx.file("schema.txt", "v1");
    fx.script.write("gen.d", "gen.c: schema.txt\napp.o: extra.h\n");

    let mut graph = BuildGraph::new();
    let generator = graph.add_task(TaskBuilder::new(&["gen.c", "gen.d"]).input("schema.txt").build())?;
    let app = graph.add_task(TaskBuilder::new(&["app.o"]).input("gen.c").build())?;
    let extra = graph.add_task(TaskBuilder::new(&["extra.h"]).build())?;
    let mut build = fx.build(graph);

    // extra.h is outside app.o's declared closure until gen.d is read, and
    // app.o must still wait for it.
    let report = fx.build_target(&mut build, "app.o").await?;
    assert_eq!(report.ran(), vec![generator, app, extra]);
    assert_eq!(report.dispatch_order(), &[generator, extra, app]);
    assert!(build.graph().predecessors(app).contains(&extra));

    let report = fx.build_all(&mut build).await?;
    assert_eq!(report.fresh(), vec![generator, app, extra]);

    fx.file("extra.h", "#define EXTRA 2");
    let report = fx.build_all(&mut build).await?;
    assert_eq!(report.outcome(generator), Some(&Outcome::Fresh));
    assert_eq!(report.outcome(extra), Some(&Outcome::Fresh));
    assert_eq!(
        reason_of(&report, app),
        Some(StaleReason::InputChanged(PathBuf::from("extra.h")))
    );
    Ok(())
}

#[tokio::test]
async fn plan_reports_without_running() -> TestResult {
    let fx = Fixture::new();
    fx.file("a.c", "a");

    let mut graph = BuildGraph::new();
    let compile = graph.add_task(TaskBuilder::new(&["a.o"]).input("a.c").build())?;
    let link = graph.add_task(TaskBuilder::new(&["app"]).input("a.o").build())?;
    let broken = graph.add_task(TaskBuilder::new(&["x.o"]).input("missing.c").build())?;
    let after_broken = graph.add_task(TaskBuilder::new(&["x.a"]).input("x.o").build())?;
    let mut build = fx.build(graph);

    let plan = build.plan()?;
    assert_eq!(plan.action(compile), Some(&PlanAction::Run(StaleReason::NoRecord)));
    // a consumer of a would-be rebuilt output is reported as rebuilt
    assert_eq!(plan.action(link), Some(&PlanAction::Run(StaleReason::NoRecord)));
    assert!(matches!(plan.action(broken), Some(PlanAction::Fail(_))));
    assert_eq!(plan.action(after_broken), Some(&PlanAction::Skip { cause: broken }));
    assert!(fx.script.executed().is_empty());
    assert!(fx.store.is_empty());

    fx.build_all(&mut build).await?;
    fx.file("a.c", "a2");
    let plan = build.plan()?;
    assert_eq!(
        plan.action(compile),
        Some(&PlanAction::Run(StaleReason::InputChanged(PathBuf::from("a.c"))))
    );
    assert_eq!(
        plan.action(link),
        Some(&PlanAction::Run(StaleReason::InputRebuilt(PathBuf::from("a.o"))))
    );
    Ok(())
}

#[tokio::test]
async fn records_of_removed_tasks_are_pruned() -> TestResult {
    let fx = Fixture::new();

    let mut graph = BuildGraph::new();
    graph.add_task(TaskBuilder::new(&["a.o"]).build())?;
    graph.add_task(TaskBuilder::new(&["old.o"]).build())?;
    let mut build = fx.build(graph);
    fx.build_all(&mut build).await?;
    assert_eq!(fx.store.len(), 2);

    let mut graph = BuildGraph::new();
    graph.add_task(TaskBuilder::new(&["a.o"]).build())?;
    let mut build = fx.build(graph);
    let report = fx.build_all(&mut build).await?;

    assert_eq!(report.fresh().len(), 1);
    assert_eq!(fx.store.keys(), vec![TaskKey::from_outputs(["a.o"])]);
    Ok(())
}

/// Digest of the content with ASCII case folded, so case-only edits count as
/// unchanged.
#[derive(Debug)]
struct CaseFoldingHasher {
    fs: taskforge::fs::mock::MockFileSystem,
}

impl taskforge::fingerprint::ContentHasher for CaseFoldingHasher {
    fn digest(&self, path: &std::path::Path) -> anyhow::Result<String> {
        use std::io::Read;
        use taskforge::fs::FileSystem;

        let mut text = String::new();
        self.fs.open_read(path)?.read_to_string(&mut text)?;
        Ok(blake3::hash(text.to_ascii_lowercase().as_bytes()).to_hex().to_string())
    }
}

#[tokio::test]
async fn custom_hasher_decides_what_counts_as_a_change() -> TestResult {
    let fx = Fixture::new();
    fx.file("src.c", "int main() {}");

    let mut graph = BuildGraph::new();
    let id = graph.add_task(TaskBuilder::new(&["out.bin"]).input("src.c").build())?;
    let mut build = fx
        .build(graph)
        .with_hasher(Arc::new(CaseFoldingHasher { fs: fx.fs.clone() }));

    let report = fx.build_all(&mut build).await?;
    assert!(is_ran(report.outcome(id)));

    fx.file("src.c", "INT MAIN() {}");
    let report = fx.build_all(&mut build).await?;
    assert_eq!(report.outcome(id), Some(&Outcome::Fresh));

    fx.file("src.c", "int main() { }");
    let report = fx.build_all(&mut build).await?;
    assert_eq!(
        reason_of(&report, id),
        Some(StaleReason::InputChanged(PathBuf::from("src.c")))
    );
    Ok(())
}
