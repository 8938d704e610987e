use crate::badge_rpc::db_ops::*;
use crate::lifecycle::LifecycleApi;
use crate::photo::{self, PhotoOp};
use crate::qr::{self, verification_url, CredentialQr};
use crate::status::{compute_stats, DashboardStats, WorkerWithCredentials};
use crate::utils::Base64Byte;
use crate::utils::{IntoAnyhow, IntoJsonRpcResult};
use crate::verify::{self, Verification};
use entity::audit_logs::Model as AuditEntry;
use entity::credentials::Model as Credential;
use entity::workers::Model as Worker;
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::RpcModule;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound of a request body, fits a base64 encoded photo with room to spare
pub const MAX_RPC_BODY: u32 = 16 * 1024 * 1024;

/// A freshly issued credential and the address its QR code must encode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredential {
    pub credential: Credential,
    pub verification_url: String,
}

#[rpc(server, client)]
pub trait BadgeRpc {
    #[method(name = "Badge.ListWorkers")]
    async fn list_workers(&self, filter: WorkerFilter) -> RpcResult<Vec<WorkerWithCredentials>>;

    #[method(name = "Badge.GetWorker")]
    async fn get_worker(&self, id: String) -> RpcResult<WorkerWithCredentials>;

    #[method(name = "Badge.CreateWorker")]
    async fn create_worker(&self, input: WorkerInput, actor: Option<String>) -> RpcResult<Worker>;

    #[method(name = "Badge.UpdateWorker")]
    async fn update_worker(
        &self,
        id: String,
        input: WorkerInput,
        actor: Option<String>,
    ) -> RpcResult<Worker>;

    #[method(name = "Badge.DeleteWorker")]
    async fn delete_worker(&self, id: String, actor: Option<String>) -> RpcResult<Worker>;

    #[method(name = "Badge.UploadPhoto")]
    async fn upload_photo(&self, data: Base64Byte) -> RpcResult<String>;

    #[method(name = "Badge.IssueCredential")]
    async fn issue_credential(
        &self,
        worker_id: String,
        actor: Option<String>,
    ) -> RpcResult<IssuedCredential>;

    #[method(name = "Badge.RevokeCredential")]
    async fn revoke_credential(
        &self,
        credential_id: String,
        actor: Option<String>,
    ) -> RpcResult<Credential>;

    #[method(name = "Badge.ListCredentials")]
    async fn list_credentials(&self, worker_id: String) -> RpcResult<Vec<Credential>>;

    #[method(name = "Badge.CredentialQr")]
    async fn credential_qr(&self, worker_id: String) -> RpcResult<CredentialQr>;

    #[method(name = "Badge.Verify")]
    async fn verify(&self, token: String) -> RpcResult<Verification>;

    #[method(name = "Badge.ListAuditLogs")]
    async fn list_audit_logs(&self, limit: Option<u64>) -> RpcResult<Vec<AuditEntry>>;

    #[method(name = "Badge.DashboardStats")]
    async fn dashboard_stats(&self) -> RpcResult<DashboardStats>;
}

pub struct BadgeImpl {
    repo: Arc<dyn Repo + Send + Sync>,
    lifecycle: Arc<dyn LifecycleApi + Send + Sync>,
    photos: Arc<dyn PhotoOp + Send + Sync>,
    public_base_url: String,
}

#[async_trait]
impl BadgeRpcServer for BadgeImpl {
    /// Non deleted workers, newest first, each with its credential history
    async fn list_workers(&self, filter: WorkerFilter) -> RpcResult<Vec<WorkerWithCredentials>> {
        self.repo.list_workers(filter).await.to_jsonrpc_result()
    }

    async fn get_worker(&self, id: String) -> RpcResult<WorkerWithCredentials> {
        self.repo.get_worker(id).await.to_jsonrpc_result()
    }

    async fn create_worker(&self, input: WorkerInput, actor: Option<String>) -> RpcResult<Worker> {
        self.repo.create_worker(input, actor).await.to_jsonrpc_result()
    }

    async fn update_worker(
        &self,
        id: String,
        input: WorkerInput,
        actor: Option<String>,
    ) -> RpcResult<Worker> {
        self.repo
            .update_worker(id, input, actor)
            .await
            .to_jsonrpc_result()
    }

    /// Soft delete, credentials stay for the audit trail
    async fn delete_worker(&self, id: String, actor: Option<String>) -> RpcResult<Worker> {
        self.repo.delete_worker(id, actor).await.to_jsonrpc_result()
    }

    /// Store a png, jpeg or webp photo and return its public url
    async fn upload_photo(&self, data: Base64Byte) -> RpcResult<String> {
        photo::upload_photo(self.photos.as_ref(), data.into(), &self.public_base_url)
            .await
            .to_jsonrpc_result()
    }

    async fn issue_credential(
        &self,
        worker_id: String,
        actor: Option<String>,
    ) -> RpcResult<IssuedCredential> {
        let credential = self
            .lifecycle
            .issue(worker_id, actor)
            .await
            .to_jsonrpc_result()?;
        Ok(IssuedCredential {
            verification_url: verification_url(&self.public_base_url, &credential.token),
            credential,
        })
    }

    async fn revoke_credential(
        &self,
        credential_id: String,
        actor: Option<String>,
    ) -> RpcResult<Credential> {
        self.lifecycle
            .revoke(credential_id, actor)
            .await
            .to_jsonrpc_result()
    }

    async fn list_credentials(&self, worker_id: String) -> RpcResult<Vec<Credential>> {
        self.repo.list_credentials(worker_id).await.to_jsonrpc_result()
    }

    /// Png and svg of the worker's active credential, ready to print
    async fn credential_qr(&self, worker_id: String) -> RpcResult<CredentialQr> {
        self.repo
            .get_worker(worker_id)
            .await
            .and_then(|worker| qr::credential_qr(&worker, &self.public_base_url))
            .to_jsonrpc_result()
    }

    /// Same verdict the public page gives, never an error
    async fn verify(&self, token: String) -> RpcResult<Verification> {
        Ok(verify::verify_token(self.repo.as_ref(), &token, verify::today()).await)
    }

    async fn list_audit_logs(&self, limit: Option<u64>) -> RpcResult<Vec<AuditEntry>> {
        self.repo.list_audit_logs(limit).await.to_jsonrpc_result()
    }

    async fn dashboard_stats(&self) -> RpcResult<DashboardStats> {
        self.repo
            .list_workers(WorkerFilter::default())
            .await
            .map(|workers| compute_stats(&workers))
            .to_jsonrpc_result()
    }
}

/// new badge api impl and get rpc module
pub fn register(
    repo: Arc<dyn Repo + Send + Sync>,
    lifecycle: Arc<dyn LifecycleApi + Send + Sync>,
    photos: Arc<dyn PhotoOp + Send + Sync>,
    public_base_url: String,
) -> RpcModule<BadgeImpl> {
    let badge_impl = BadgeImpl {
        repo,
        lifecycle,
        photos,
        public_base_url,
    };
    badge_impl.into_rpc()
}

/// get badge api by url
pub async fn get_badge_api(url: String) -> anyhow::Result<WrapClient> {
    HttpClientBuilder::default()
        .max_request_body_size(MAX_RPC_BODY)
        .build(url.as_str())
        .map(|val| WrapClient { client: val })
        .anyhow()
}

/// WrapClient for rpc error, convert RpcResult to anyhow Result
pub struct WrapClient {
    client: HttpClient,
}

#[async_trait]
pub trait BadgeServiceRpcClient {
    async fn list_workers(&self, filter: WorkerFilter) -> anyhow::Result<Vec<WorkerWithCredentials>>;

    async fn get_worker(&self, id: String) -> anyhow::Result<WorkerWithCredentials>;

    async fn create_worker(
        &self,
        input: WorkerInput,
        actor: Option<String>,
    ) -> anyhow::Result<Worker>;

    async fn update_worker(
        &self,
        id: String,
        input: WorkerInput,
        actor: Option<String>,
    ) -> anyhow::Result<Worker>;

    async fn delete_worker(&self, id: String, actor: Option<String>) -> anyhow::Result<Worker>;

    async fn upload_photo(&self, data: Vec<u8>) -> anyhow::Result<String>;

    async fn issue_credential(
        &self,
        worker_id: String,
        actor: Option<String>,
    ) -> anyhow::Result<IssuedCredential>;

    async fn revoke_credential(
        &self,
        credential_id: String,
        actor: Option<String>,
    ) -> anyhow::Result<Credential>;

    async fn list_credentials(&self, worker_id: String) -> anyhow::Result<Vec<Credential>>;

    async fn credential_qr(&self, worker_id: String) -> anyhow::Result<CredentialQr>;

    async fn verify(&self, token: String) -> anyhow::Result<Verification>;

    async fn list_audit_logs(&self, limit: Option<u64>) -> anyhow::Result<Vec<AuditEntry>>;

    async fn dashboard_stats(&self) -> anyhow::Result<DashboardStats>;
}

#[async_trait]
impl BadgeServiceRpcClient for WrapClient {
    async fn list_workers(&self, filter: WorkerFilter) -> anyhow::Result<Vec<WorkerWithCredentials>> {
        self.client.list_workers(filter).await.anyhow()
    }

    async fn get_worker(&self, id: String) -> anyhow::Result<WorkerWithCredentials> {
        self.client.get_worker(id).await.anyhow()
    }

    async fn create_worker(
        &self,
        input: WorkerInput,
        actor: Option<String>,
    ) -> anyhow::Result<Worker> {
        self.client.create_worker(input, actor).await.anyhow()
    }

    async fn update_worker(
        &self,
        id: String,
        input: WorkerInput,
        actor: Option<String>,
    ) -> anyhow::Result<Worker> {
        self.client.update_worker(id, input, actor).await.anyhow()
    }

    async fn delete_worker(&self, id: String, actor: Option<String>) -> anyhow::Result<Worker> {
        self.client.delete_worker(id, actor).await.anyhow()
    }

    async fn upload_photo(&self, data: Vec<u8>) -> anyhow::Result<String> {
        self.client.upload_photo(Base64Byte(data)).await.anyhow()
    }

    async fn issue_credential(
        &self,
        worker_id: String,
        actor: Option<String>,
    ) -> anyhow::Result<IssuedCredential> {
        self.client.issue_credential(worker_id, actor).await.anyhow()
    }

    async fn revoke_credential(
        &self,
        credential_id: String,
        actor: Option<String>,
    ) -> anyhow::Result<Credential> {
        self.client
            .revoke_credential(credential_id, actor)
            .await
            .anyhow()
    }

    async fn list_credentials(&self, worker_id: String) -> anyhow::Result<Vec<Credential>> {
        self.client.list_credentials(worker_id).await.anyhow()
    }

    async fn credential_qr(&self, worker_id: String) -> anyhow::Result<CredentialQr> {
        self.client.credential_qr(worker_id).await.anyhow()
    }

    async fn verify(&self, token: String) -> anyhow::Result<Verification> {
        self.client.verify(token).await.anyhow()
    }

    async fn list_audit_logs(&self, limit: Option<u64>) -> anyhow::Result<Vec<AuditEntry>> {
        self.client.list_audit_logs(limit).await.anyhow()
    }

    async fn dashboard_stats(&self) -> anyhow::Result<DashboardStats> {
        self.client.dashboard_stats().await.anyhow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge_rpc::db_ops::fixtures::{input, memory_db};
    use crate::lifecycle::CredentialLifecycle;
    use crate::photo::fixtures::jpeg;
    use crate::photo::DbPhotoStore;
    use crate::verify::Verdict;
    use jsonrpsee::http_server::HttpServerBuilder;
    use std::net::SocketAddr;

    async fn badge_impl() -> BadgeImpl {
        let conn = memory_db().await;
        let repo = Arc::new(DbOpsImpl::new(conn.clone()));
        BadgeImpl {
            repo: repo.clone(),
            lifecycle: Arc::new(CredentialLifecycle::new(conn)),
            photos: Arc::new(DbPhotoStore::new(repo)),
            public_base_url: "https://carnet.example.org/".to_owned(),
        }
    }

    #[tokio::test]
    async fn issue_returns_verification_url() {
        let api = badge_impl().await;
        let worker = BadgeRpcServer::create_worker(&api, input("Ana", "V-1"), None)
            .await
            .unwrap();
        let issued = api.issue_credential(worker.id.clone(), None).await.unwrap();
        assert_eq!(
            issued.verification_url,
            format!("https://carnet.example.org/verify/{}", issued.credential.token)
        );

        let err = api.issue_credential(worker.id, None).await.unwrap_err();
        assert!(err.to_string().contains("conflict"));
    }

    #[tokio::test]
    async fn dashboard_counts_current_rows() {
        let api = badge_impl().await;
        let a = BadgeRpcServer::create_worker(&api, input("Ana", "V-1"), None)
            .await
            .unwrap();
        let mut inactive = input("Bea", "V-2");
        inactive.status = entity::WorkerStatus::Inactivo;
        BadgeRpcServer::create_worker(&api, inactive, None).await.unwrap();
        api.issue_credential(a.id, None).await.unwrap();

        let stats = api.dashboard_stats().await.unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                total: 2,
                active: 1,
                inactive: 1,
                expired: 0,
                with_qr: 1
            }
        );
    }

    #[tokio::test]
    async fn client_round_trip_over_http() {
        let module = {
            let api = badge_impl().await;
            api.into_rpc()
        };
        let server = HttpServerBuilder::default()
            .max_request_body_size(MAX_RPC_BODY)
            .build("127.0.0.1:0".parse::<SocketAddr>().unwrap())
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.start(module).unwrap();

        let client = get_badge_api(format!("http://{}", addr)).await.unwrap();
        let worker = client
            .create_worker(input("Ana", "V-1"), Some("admin".to_owned()))
            .await
            .unwrap();
        let photo_url = client.upload_photo(jpeg()).await.unwrap();
        assert!(photo_url.starts_with("https://carnet.example.org/photos/"));

        let issued = client.issue_credential(worker.id.clone(), None).await.unwrap();
        let verdict = client.verify(issued.credential.token.clone()).await.unwrap();
        assert_eq!(verdict.verdict, Verdict::Valid);

        let qr = client.credential_qr(worker.id.clone()).await.unwrap();
        assert_eq!(qr.verification_url, issued.verification_url);
        assert_eq!(qr.file_name, format!("QR_{}_Pérez.png", worker.internal_id));
        assert!(!qr.png.is_empty());

        client
            .revoke_credential(issued.credential.id.clone(), None)
            .await
            .unwrap();
        let verdict = client.verify(issued.credential.token).await.unwrap();
        assert_eq!(verdict.verdict, Verdict::Revoked);
        let err = client.credential_qr(worker.id.clone()).await.unwrap_err();
        assert!(err.to_string().contains("not found"));

        let err = client.get_worker("missing".to_owned()).await.unwrap_err();
        assert!(err.to_string().contains("not found"));

        let listed = client.list_workers(WorkerFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].qr_codes.len(), 1);

        assert_eq!(client.list_audit_logs(Some(10)).await.unwrap().len(), 3);
        handle.stop().unwrap();
    }
}
