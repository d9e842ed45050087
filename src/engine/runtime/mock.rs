//! `mockall` double of [`ContainerRuntime`] shared by unit tests.

use bollard::models::ContainerCreateBody;
use bollard::query_parameters::CreateContainerOptions;
use mockall::mock;

use super::{ContainerRuntime, ContainerStatus, EngineFuture, LogStream};

mock! {
    #[derive(Debug)]
    pub Runtime {}

    impl ContainerRuntime for Runtime {
        fn image_exists(&self, image: &str) -> EngineFuture<'_, bool>;
        fn pull_image(&self, image: &str) -> EngineFuture<'_, ()>;
        fn create_container(
            &self,
            options: Option<CreateContainerOptions>,
            body: ContainerCreateBody,
        ) -> EngineFuture<'_, String>;
        fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
        fn follow_logs(&self, container_id: &str) -> LogStream<'_>;
        fn tail_logs(&self, container_id: &str, lines: usize) -> EngineFuture<'_, String>;
        fn container_status(&self, container_id: &str) -> EngineFuture<'_, ContainerStatus>;
        fn wait_container(&self, container_id: &str) -> EngineFuture<'_, Option<i64>>;
        fn kill_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
        fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
    }
}
