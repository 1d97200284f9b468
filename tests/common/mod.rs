#![allow(dead_code)]

use std::sync::Arc;

use taskforge::dag::BuildGraph;
use taskforge::engine::{Build, BuildPlan, ExecutionReport, RunOptions};
use taskforge::env::MapEnv;
use taskforge::errors::Result;
use taskforge::fs::mock::MockFileSystem;
use taskforge::store::MemoryRecordStore;
use taskforge::types::FailurePolicy;

pub use taskforge_test_utils::builders;
pub use taskforge_test_utils::{init_tracing, with_timeout, FakeScript};

/// Mock filesystem, in-memory record store and a scripted executor, shared
/// by every build a test creates.
pub struct Fixture {
    pub fs: MockFileSystem,
    pub store: MemoryRecordStore,
    pub script: FakeScript,
    pub env: MapEnv,
    pub options: RunOptions,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let fs = MockFileSystem::new();
        Self {
            script: FakeScript::new(fs.clone()),
            fs,
            store: MemoryRecordStore::new(),
            env: MapEnv::new(),
            options: RunOptions {
                jobs: 4,
                on_failure: FailurePolicy::Continue,
            },
        }
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.options.jobs = jobs;
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.options.on_failure = policy;
        self
    }

    pub fn file(&self, path: &str, content: &str) -> &Self {
        self.fs.add_file(path, content);
        self
    }

    pub fn build(&self, graph: BuildGraph) -> Build {
        Build::new(graph, Box::new(self.store.clone()))
            .with_filesystem(Arc::new(self.fs.clone()))
            .with_env(Arc::new(self.env.clone()))
            .with_options(self.options)
    }

    pub async fn build_all(&self, build: &mut Build) -> Result<ExecutionReport> {
        let script = self.script.clone();
        with_timeout(build.build_all(move |tx| script.executor(tx))).await
    }

    pub async fn build_target(&self, build: &mut Build, target: &str) -> Result<ExecutionReport> {
        let script = self.script.clone();
        with_timeout(build.build_target(target, move |tx| script.executor(tx))).await
    }

    pub fn plan(&self, build: &mut Build) -> Result<BuildPlan> {
        build.plan()
    }
}
