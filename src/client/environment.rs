use super::automation::AutomationClient;
use super::bucket::BucketClient;
use super::classic_api::ClassicApiClient;
use super::document::DocumentClient;
use super::generic::GenericUpsertClient;
use super::settings::SettingsClient;
use super::transport::HttpTransport;

/// The full set of typed API clients for one environment, all sharing a
/// single [`HttpTransport`] (one connection pool, one semaphore, one retry
/// policy). Cloning an `EnvironmentClients` is cheap — every field is a
/// clone of the same underlying transport handle — so the scheduler hands
/// each component task its own copy rather than wrapping this in an `Arc`.
#[derive(Clone)]
pub struct EnvironmentClients {
    transport: HttpTransport,
}

impl EnvironmentClients {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub fn environment(&self) -> &str {
        self.transport.environment()
    }

    pub fn classic_api(&self, api_id: &str) -> ClassicApiClient {
        ClassicApiClient::new(self.transport.clone(), api_id)
    }

    pub fn settings(&self) -> SettingsClient {
        SettingsClient::new(self.transport.clone())
    }

    pub fn automation(&self) -> AutomationClient {
        AutomationClient::new(self.transport.clone())
    }

    pub fn bucket(&self) -> BucketClient {
        BucketClient::new(self.transport.clone())
    }

    pub fn document(&self) -> DocumentClient {
        DocumentClient::new(self.transport.clone())
    }

    pub fn openpipeline(&self, kind: &str) -> GenericUpsertClient {
        GenericUpsertClient::openpipeline(self.transport.clone(), kind)
    }

    pub fn segment(&self) -> GenericUpsertClient {
        GenericUpsertClient::segment(self.transport.clone())
    }

    pub fn slo(&self) -> GenericUpsertClient {
        GenericUpsertClient::slo(self.transport.clone())
    }
}
