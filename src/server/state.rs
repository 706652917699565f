use std::sync::Arc;
use std::time::Instant;

use crate::auth::{AuthService, JwtAuthService};
use crate::cluster::{create_transport, ClusterRouter, ClusterTransport, Subscription};
use crate::config::Settings;
use crate::dispatcher::{DispatcherBuilder, HandlerContext, PacketDispatcher};
use crate::error::Result;
use crate::metrics::MetricsListener;
use crate::session::{
    AutoSubscribeGroups, GroupMembership, GroupSubscriptionIndex, IndexWriter,
    LocalSessionIdGenerator, SessionIdGenerator, SessionRegistry,
};
use crate::storage::{MessageStorageService, NoopMessageStorage};

/// Pluggable collaborators of the server. Everything else is built from
/// [`Settings`].
pub struct Components {
    pub auth: Arc<dyn AuthService>,
    pub storage: Arc<dyn MessageStorageService>,
    pub id_generator: Arc<dyn SessionIdGenerator>,
    /// Enables automatic group subscription on connect
    pub membership: Option<Arc<dyn GroupMembership>>,
    /// `None` runs single-node
    pub transport: Option<Arc<dyn ClusterTransport>>,
}

impl Components {
    /// JWT authentication, no persistence, no membership source, single-node.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            auth: Arc::new(JwtAuthService::new(&settings.auth)),
            storage: Arc::new(NoopMessageStorage),
            id_generator: Arc::new(LocalSessionIdGenerator::new()),
            membership: None,
            transport: None,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: Arc<dyn AuthService>,
    pub id_generator: Arc<dyn SessionIdGenerator>,
    pub registry: SessionRegistry,
    pub groups: GroupSubscriptionIndex,
    pub dispatcher: Arc<PacketDispatcher>,
    /// Present only in cluster mode
    pub router: Option<Arc<ClusterRouter>>,
    pub started_at: Instant,
    /// Routed packets are delivered while this is alive
    _cluster_subscription: Option<Arc<Subscription>>,
}

impl AppState {
    /// Build the state for `settings`, connecting to Redis when cluster mode
    /// is enabled.
    pub async fn new(settings: Settings) -> Result<Self> {
        let mut components = Components::from_settings(&settings);
        components.transport = create_transport(&settings.cluster).await;
        Self::with_components(settings, components).await
    }

    pub async fn with_components(settings: Settings, components: Components) -> Result<Self> {
        let writer = IndexWriter::spawn(settings.session.mutation_queue_capacity);
        let registry = SessionRegistry::new(writer.clone());
        let groups = GroupSubscriptionIndex::new(writer);

        let metrics_listener = Arc::new(MetricsListener);
        registry.register_listener(metrics_listener.clone()).await;
        groups.register_listener(metrics_listener).await;

        if let Some(membership) = components.membership {
            registry
                .register_listener(Arc::new(AutoSubscribeGroups::new(membership, groups.clone())))
                .await;
        }

        let (router, cluster_subscription) = match components.transport {
            Some(transport) => {
                let router = Arc::new(ClusterRouter::new(
                    &settings.cluster,
                    transport,
                    registry.clone(),
                    groups.clone(),
                ));
                let subscription = router.start().await?;
                (Some(router), Some(Arc::new(subscription)))
            }
            None => (None, None),
        };

        let ctx = HandlerContext {
            registry: registry.clone(),
            groups: groups.clone(),
            storage: components.storage,
            router: router.clone(),
            message: settings.message.clone(),
        };
        let dispatcher = Arc::new(DispatcherBuilder::with_default_handlers(ctx).build());

        tracing::debug!(
            namespaces = ?dispatcher.namespaces().collect::<Vec<_>>(),
            cluster = router.is_some(),
            "Packet dispatcher ready"
        );

        Ok(Self {
            settings: Arc::new(settings),
            auth: components.auth,
            id_generator: components.id_generator,
            registry,
            groups,
            dispatcher,
            router,
            started_at: Instant::now(),
            _cluster_subscription: cluster_subscription,
        })
    }
}
