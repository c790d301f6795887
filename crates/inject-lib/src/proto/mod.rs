//! CRI `runtime.v1` protocol types
//!
//! With the `proto-gen` feature the client is generated at build time by
//! tonic-build from `proto/runtime/v1/api.proto`. Without it, the message
//! subset below is used. Only the three calls the resolver needs are present:
//! `ListPodSandbox`, `PodSandboxStatus` and `ContainerStatus`.

#[cfg(feature = "proto-gen")]
pub mod runtime {
    pub mod v1 {
        tonic::include_proto!("runtime.v1");
    }
}

#[cfg(not(feature = "proto-gen"))]
pub mod runtime {
    pub mod v1 {
        use prost::Message;
        use std::collections::HashMap;

        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandboxMetadata {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(string, tag = "2")]
            pub uid: String,
            #[prost(string, tag = "3")]
            pub namespace: String,
            #[prost(uint32, tag = "4")]
            pub attempt: u32,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[repr(i32)]
        pub enum PodSandboxState {
            #[default]
            SandboxReady = 0,
            SandboxNotready = 1,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandboxStateValue {
            #[prost(int32, tag = "1")]
            pub state: i32,
        }

        /// All fields are ANDed by the runtime.
        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandboxFilter {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(message, optional, tag = "2")]
            pub state: Option<PodSandboxStateValue>,
            #[prost(map = "string, string", tag = "3")]
            pub label_selector: HashMap<String, String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ListPodSandboxRequest {
            #[prost(message, optional, tag = "1")]
            pub filter: Option<PodSandboxFilter>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandbox {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(message, optional, tag = "2")]
            pub metadata: Option<PodSandboxMetadata>,
            #[prost(int32, tag = "3")]
            pub state: i32,
            #[prost(int64, tag = "4")]
            pub created_at: i64,
            #[prost(map = "string, string", tag = "5")]
            pub labels: HashMap<String, String>,
            #[prost(map = "string, string", tag = "6")]
            pub annotations: HashMap<String, String>,
            #[prost(string, tag = "7")]
            pub runtime_handler: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ListPodSandboxResponse {
            #[prost(message, repeated, tag = "1")]
            pub items: Vec<PodSandbox>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandboxStatusRequest {
            #[prost(string, tag = "1")]
            pub pod_sandbox_id: String,
            #[prost(bool, tag = "2")]
            pub verbose: bool,
        }

        /// Only the verbose `info` map is decoded; the status body is skipped.
        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandboxStatusResponse {
            #[prost(map = "string, string", tag = "2")]
            pub info: HashMap<String, String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerStatusRequest {
            #[prost(string, tag = "1")]
            pub container_id: String,
            #[prost(bool, tag = "2")]
            pub verbose: bool,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerStatusResponse {
            #[prost(map = "string, string", tag = "2")]
            pub info: HashMap<String, String>,
        }

        pub mod runtime_service_client {
            use super::*;
            use tonic::codegen::*;

            #[derive(Debug, Clone)]
            pub struct RuntimeServiceClient<T> {
                inner: tonic::client::Grpc<T>,
            }

            impl RuntimeServiceClient<tonic::transport::Channel> {
                pub fn new(channel: tonic::transport::Channel) -> Self {
                    let inner = tonic::client::Grpc::new(channel);
                    Self { inner }
                }
            }

            impl<T> RuntimeServiceClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::BoxBody>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + Send,
            {
                pub async fn pod_sandbox_status(
                    &mut self,
                    request: impl tonic::IntoRequest<PodSandboxStatusRequest>,
                ) -> Result<tonic::Response<PodSandboxStatusResponse>, tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/runtime.v1.RuntimeService/PodSandboxStatus",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn list_pod_sandbox(
                    &mut self,
                    request: impl tonic::IntoRequest<ListPodSandboxRequest>,
                ) -> Result<tonic::Response<ListPodSandboxResponse>, tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/runtime.v1.RuntimeService/ListPodSandbox",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn container_status(
                    &mut self,
                    request: impl tonic::IntoRequest<ContainerStatusRequest>,
                ) -> Result<tonic::Response<ContainerStatusResponse>, tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/runtime.v1.RuntimeService/ContainerStatus",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }
            }
        }
    }
}

pub use runtime::v1::runtime_service_client::RuntimeServiceClient;
pub use runtime::v1::*;

/// Label the kubelet puts on every sandbox with the pod name
pub const POD_NAME_LABEL: &str = "io.kubernetes.pod.name";
/// Label the kubelet puts on every sandbox with the pod namespace
pub const POD_NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
