//! In-memory container runtime driven by a per-attempt script.
//!
//! Each created container takes the behaviour at its creation index; the
//! last behaviour repeats once the script runs out. Containers that exit do
//! so as soon as they start; hanging containers stay running until killed.
#![allow(
    clippy::allow_attributes,
    dead_code,
    reason = "each test binary uses a different subset of the helpers"
)]

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bollard::errors::Error as EngineError;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::CreateContainerOptions;
use futures_util::{future, stream};
use trainbot::engine::{ContainerRuntime, ContainerStatus, EngineFuture, LogStream};

/// What a container does once started.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Print `lines` and exit with `code`.
    Exit {
        /// Output lines, each sent as one chunk.
        lines: Vec<String>,
        /// Exit status code.
        code: i64,
    },
    /// Never print and never exit.
    Hang,
}

impl Behaviour {
    /// Print `count` progress lines and exit with `code`.
    pub fn exit_after_lines(count: usize, code: i64) -> Self {
        Self::Exit {
            lines: (1..=count).map(|n| format!("epoch {n} loss=0.{n}")).collect(),
            code,
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    images: HashSet<String>,
    containers: HashMap<String, (ContainerStatus, Behaviour)>,
    created: Vec<String>,
    names: Vec<String>,
    killed: Vec<String>,
    removed: Vec<String>,
    pulls: usize,
}

/// Scripted stand-in for a container engine.
#[derive(Debug)]
pub struct ScriptedRuntime {
    script: Vec<Behaviour>,
    ledger: Mutex<Ledger>,
}

impl ScriptedRuntime {
    /// Runtime whose image is already present locally.
    pub fn new(script: Vec<Behaviour>) -> Self {
        let runtime = Self::without_image(script);
        runtime.lock().images.insert(String::from("ai-training:latest"));
        runtime
    }

    /// Runtime that must pull the image first.
    pub fn without_image(script: Vec<Behaviour>) -> Self {
        Self {
            script,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Ids of every container created so far.
    pub fn created(&self) -> Vec<String> {
        self.lock().created.clone()
    }

    /// Names requested for each created container.
    pub fn names(&self) -> Vec<String> {
        self.lock().names.clone()
    }

    /// Ids of killed containers.
    pub fn killed(&self) -> Vec<String> {
        self.lock().killed.clone()
    }

    /// Ids of removed containers.
    pub fn removed(&self) -> Vec<String> {
        self.lock().removed.clone()
    }

    /// Number of image pulls.
    pub fn pulls(&self) -> usize {
        self.lock().pulls
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn behaviour(&self, container_id: &str) -> Option<Behaviour> {
        self.lock()
            .containers
            .get(container_id)
            .map(|(_, behaviour)| behaviour.clone())
    }
}

fn not_found(what: &str) -> EngineError {
    EngineError::DockerResponseServerError {
        status_code: 404,
        message: format!("no such container: {what}"),
    }
}

fn ready<T: Send + 'static>(value: Result<T, EngineError>) -> EngineFuture<'static, T> {
    Box::pin(future::ready(value))
}

impl ContainerRuntime for ScriptedRuntime {
    fn image_exists(&self, image: &str) -> EngineFuture<'_, bool> {
        ready(Ok(self.lock().images.contains(image)))
    }

    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()> {
        let mut ledger = self.lock();
        ledger.pulls += 1;
        ledger.images.insert(image.to_owned());
        ready(Ok(()))
    }

    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        _body: ContainerCreateBody,
    ) -> EngineFuture<'_, String> {
        let mut ledger = self.lock();
        let index = ledger.created.len();
        let behaviour = self
            .script
            .get(index)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or(Behaviour::Hang);
        let id = format!("ctr-{index}");
        ledger
            .containers
            .insert(id.clone(), (ContainerStatus::Created, behaviour));
        ledger.created.push(id.clone());
        ledger
            .names
            .push(options.and_then(|o| o.name).unwrap_or_default());
        ready(Ok(id))
    }

    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let mut ledger = self.lock();
        let Some((status, behaviour)) = ledger.containers.get_mut(container_id) else {
            return ready(Err(not_found(container_id)));
        };
        *status = match behaviour {
            Behaviour::Exit { .. } => ContainerStatus::Exited,
            Behaviour::Hang => ContainerStatus::Running,
        };
        ready(Ok(()))
    }

    fn follow_logs(&self, container_id: &str) -> LogStream<'_> {
        match self.behaviour(container_id) {
            Some(Behaviour::Exit { lines, .. }) => Box::pin(stream::iter(
                lines
                    .into_iter()
                    .map(|line| Ok::<_, EngineError>(format!("{line}\n").into_bytes())),
            )),
            Some(Behaviour::Hang) => Box::pin(stream::pending::<Result<Vec<u8>, EngineError>>()),
            None => Box::pin(stream::once(future::ready(Err::<Vec<u8>, _>(
                not_found(container_id),
            )))),
        }
    }

    fn tail_logs(&self, container_id: &str, lines: usize) -> EngineFuture<'_, String> {
        let tail = match self.behaviour(container_id) {
            Some(Behaviour::Exit { lines: output, .. }) => {
                let skip = output.len().saturating_sub(lines);
                output.into_iter().skip(skip).collect::<Vec<_>>().join("\n")
            }
            _ => String::new(),
        };
        ready(Ok(tail))
    }

    fn container_status(&self, container_id: &str) -> EngineFuture<'_, ContainerStatus> {
        let status = self
            .lock()
            .containers
            .get(container_id)
            .map(|(status, _)| *status);
        ready(status.ok_or_else(|| not_found(container_id)))
    }

    fn wait_container(&self, container_id: &str) -> EngineFuture<'_, Option<i64>> {
        match self.behaviour(container_id) {
            Some(Behaviour::Exit { code, .. }) => ready(Ok(Some(code))),
            Some(Behaviour::Hang) => Box::pin(future::pending::<Result<Option<i64>, EngineError>>()),
            None => ready(Err(not_found(container_id))),
        }
    }

    fn kill_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let mut ledger = self.lock();
        let Some((status, _)) = ledger.containers.get_mut(container_id) else {
            return ready(Err(not_found(container_id)));
        };
        *status = ContainerStatus::Exited;
        ledger.killed.push(container_id.to_owned());
        ready(Ok(()))
    }

    fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let mut ledger = self.lock();
        if ledger.containers.remove(container_id).is_none() {
            return ready(Err(not_found(container_id)));
        }
        ledger.removed.push(container_id.to_owned());
        ready(Ok(()))
    }
}
