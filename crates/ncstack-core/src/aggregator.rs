// ── Operational-state aggregator ──
//
// Fans the per-replica results of one create/update/delete back in. The
// first `Connected` result wins as the base node; every replica's status
// entries are merged into its cluster status list. Host, port and
// capabilities are taken from the base as-is.

use std::future::Future;

use futures_util::future::try_join_all;
use ncstack_api::TopologyId;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{NodeStatus, OperationalNode};

#[derive(Debug, Clone)]
pub struct OperationalStateAggregator {
    topology_id: TopologyId,
}

impl OperationalStateAggregator {
    pub fn new(topology_id: TopologyId) -> Self {
        Self { topology_id }
    }

    /// Waits for every create attempt; the first failure fails the whole
    /// combination with that cause.
    pub async fn combine_create_attempts<F>(&self, attempts: Vec<F>) -> Result<OperationalNode, CoreError>
    where
        F: Future<Output = Result<OperationalNode, CoreError>> + Send,
    {
        let results = try_join_all(attempts).await?;
        self.combine(results)
    }

    /// Same policy as [`combine_create_attempts`](Self::combine_create_attempts).
    pub async fn combine_update_attempts<F>(&self, attempts: Vec<F>) -> Result<OperationalNode, CoreError>
    where
        F: Future<Output = Result<OperationalNode, CoreError>> + Send,
    {
        let results = try_join_all(attempts).await?;
        self.combine(results)
    }

    /// All-or-nothing: any failed delete fails the combination.
    pub async fn combine_delete_attempts<F>(&self, attempts: Vec<F>) -> Result<(), CoreError>
    where
        F: Future<Output = Result<(), CoreError>> + Send,
    {
        let replicas = attempts.len();
        try_join_all(attempts).await?;
        debug!(topology = %self.topology_id, replicas, "delete attempts combined");
        Ok(())
    }

    fn combine(&self, results: Vec<OperationalNode>) -> Result<OperationalNode, CoreError> {
        if results.is_empty() {
            return Err(CoreError::illegal_state("no replica results to combine"));
        }

        let cluster_status: Vec<NodeStatus> = results
            .iter()
            .flat_map(|node| node.cluster_status.iter().cloned())
            .collect();

        let base_index = results
            .iter()
            .position(OperationalNode::is_connected)
            .unwrap_or_else(|| {
                warn!(
                    topology = %self.topology_id,
                    results = ?results,
                    "no replica reports connected, using the first result"
                );
                0
            });

        results
            .into_iter()
            .nth(base_index)
            .map(|base| base.with_cluster_status(cluster_status))
            .ok_or_else(|| CoreError::illegal_state("no replica results to combine"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::FutureExt;
    use futures_util::future::{self, BoxFuture};
    use ncstack_api::{Host, NodeId};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{ClusterStatus, ConnectionStatus};

    type Attempt = BoxFuture<'static, Result<OperationalNode, CoreError>>;

    fn aggregator() -> OperationalStateAggregator {
        OperationalStateAggregator::new(TopologyId::new("topology-netconf"))
    }

    fn result(replica: &str, status: ConnectionStatus, host: &str) -> Attempt {
        let cluster = match status {
            ConnectionStatus::Connected => ClusterStatus::Connected,
            ConnectionStatus::Connecting => ClusterStatus::Unavailable,
            ConnectionStatus::UnableToConnect => ClusterStatus::Failed,
        };
        let node = OperationalNode::new(NodeId::new("r1"), status, Host::Domain(host.into()), 830)
            .with_cluster_status(vec![NodeStatus::new(replica, cluster)]);
        future::ready(Ok(node)).boxed()
    }

    fn statuses(node: &OperationalNode) -> Vec<(String, ClusterStatus)> {
        node.cluster_status
            .iter()
            .map(|s| (s.replica.clone(), s.status))
            .collect()
    }

    #[tokio::test]
    async fn prefers_connected_result_and_merges_every_status() {
        let combined = aggregator()
            .combine_create_attempts(vec![
                result("member-1", ConnectionStatus::UnableToConnect, "a.lab"),
                result("member-2", ConnectionStatus::Connected, "b.lab"),
                result("member-3", ConnectionStatus::UnableToConnect, "c.lab"),
            ])
            .await
            .unwrap();

        assert_eq!(combined.connection_status, ConnectionStatus::Connected);
        assert_eq!(combined.host, Host::Domain("b.lab".into()));
        assert_eq!(
            statuses(&combined),
            vec![
                ("member-1".to_owned(), ClusterStatus::Failed),
                ("member-2".to_owned(), ClusterStatus::Connected),
                ("member-3".to_owned(), ClusterStatus::Failed),
            ]
        );
    }

    #[tokio::test]
    async fn falls_back_to_first_result_when_none_connected() {
        let combined = aggregator()
            .combine_update_attempts(vec![
                result("member-1", ConnectionStatus::Connecting, "a.lab"),
                result("member-2", ConnectionStatus::UnableToConnect, "b.lab"),
            ])
            .await
            .unwrap();

        assert_eq!(combined.connection_status, ConnectionStatus::Connecting);
        assert_eq!(combined.host, Host::Domain("a.lab".into()));
        assert_eq!(combined.cluster_status.len(), 2);
    }

    #[tokio::test]
    async fn first_connected_wins_ties() {
        let combined = aggregator()
            .combine_create_attempts(vec![
                result("member-1", ConnectionStatus::Connected, "a.lab"),
                result("member-2", ConnectionStatus::Connected, "b.lab"),
            ])
            .await
            .unwrap();
        assert_eq!(combined.host, Host::Domain("a.lab".into()));
    }

    #[tokio::test]
    async fn any_failed_attempt_fails_the_combination() {
        let failing: Attempt = future::ready(Err(CoreError::HandlerClosed {
            node_id: "r1".into(),
        }))
        .boxed();

        let err = aggregator()
            .combine_create_attempts(vec![
                result("member-1", ConnectionStatus::Connected, "a.lab"),
                failing,
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::HandlerClosed { .. }));
    }

    #[tokio::test]
    async fn deletes_are_all_or_nothing() {
        let aggregator = aggregator();
        let ok = || future::ready(Ok::<(), CoreError>(())).boxed();

        aggregator.combine_delete_attempts(vec![ok(), ok()]).await.unwrap();

        let err = aggregator
            .combine_delete_attempts(vec![
                ok(),
                future::ready(Err(CoreError::illegal_state("replica gone"))).boxed(),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::IllegalState { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_an_error() {
        let err = aggregator()
            .combine_create_attempts(Vec::<Attempt>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::IllegalState { .. }));
    }
}
