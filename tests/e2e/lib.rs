#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    use std::time::Duration;

    use chop_operator::crd::chi::{
        ClickHouseInstallation, ClickHouseInstallationSpec, ClusterSpec, ConfigurationSpec, LayoutSpec,
        ReconcilePhase,
    };
    use k8s_openapi::api::apps::v1::StatefulSet;
    use k8s_openapi::api::core::v1::Service;
    use kube::api::{Api, Patch, PatchParams, PostParams};
    use kube::client::Client;
    use kube::runtime::wait::{await_condition, conditions, Condition};
    use kube::ResourceExt;
    use tokio::time::timeout;

    fn is_chi_phase(phase: ReconcilePhase) -> impl Condition<ClickHouseInstallation> {
        move |obj: Option<&ClickHouseInstallation>| {
            obj.and_then(|chi| chi.status.as_ref())
                .and_then(|s| s.phase)
                .map(|p| p == phase)
                .unwrap_or(false)
        }
    }

    fn is_stateful_set_ready() -> impl Condition<StatefulSet> {
        |obj: Option<&StatefulSet>| {
            if let Some(sts) = &obj {
                if let Some(status) = &sts.status {
                    return status.replicas == status.ready_replicas.unwrap_or(0);
                }
            }
            false
        }
    }

    async fn wait_for<R, C>(api: Api<R>, name: &str, condition: C)
    where
        R: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + Send + 'static,
        C: Condition<R>,
    {
        timeout(Duration::from_secs(60), await_condition(api, name, condition))
            .await
            .unwrap()
            .unwrap();
    }

    fn minimal_chi(name: &str, shards: i32, replicas: i32) -> ClickHouseInstallation {
        ClickHouseInstallation::new(
            name,
            ClickHouseInstallationSpec {
                configuration: ConfigurationSpec {
                    clusters: vec![ClusterSpec {
                        name: "main".to_string(),
                        layout: Some(LayoutSpec {
                            shards_count: Some(shards),
                            replicas_count: Some(replicas),
                            shards: None,
                        }),
                    }],
                },
                templates: None,
                defaults: None,
                stop: None,
                reconciling: None,
            },
        )
    }

    fn stateful_set_name(chi_name: &str, shard: usize, replica: usize) -> String {
        format!("chi-{chi_name}-main-{shard}-{replica}")
    }

    fn service_name(chi_name: &str) -> String {
        format!("chi-{chi_name}")
    }

    async fn setup(name: &str) -> (Api<ClickHouseInstallation>, Api<StatefulSet>) {
        let client = Client::try_default().await.unwrap();
        let chi_api = Api::<ClickHouseInstallation>::namespaced(client.clone(), "default");
        let sts_api = Api::<StatefulSet>::namespaced(client.clone(), "default");

        chi_api
            .create(&PostParams::default(), &minimal_chi(name, 1, 1))
            .await
            .unwrap();

        wait_for(sts_api.clone(), &stateful_set_name(name, 0, 0), is_stateful_set_ready()).await;
        wait_for(chi_api.clone(), name, is_chi_phase(ReconcilePhase::ReconcileComplete)).await;
        (chi_api, sts_api)
    }

    #[tokio::test]
    async fn chi_create_materializes_one_statefulset() {
        let name = "test-create";
        setup(name).await;
    }

    #[tokio::test]
    async fn chi_scale_up_adds_a_host() {
        let name = "test-scale-up";
        let (chi_api, sts_api) = setup(name).await;

        let mut chi = chi_api.get(name).await.unwrap();
        chi.spec.configuration.clusters[0]
            .layout
            .as_mut()
            .unwrap()
            .replicas_count = Some(2);
        chi.metadata.managed_fields = None;
        chi_api
            .patch(name, &PatchParams::apply("e2e-tests").force(), &Patch::Apply(&chi))
            .await
            .unwrap();

        wait_for(sts_api.clone(), &stateful_set_name(name, 0, 1), is_stateful_set_ready()).await;
        wait_for(chi_api.clone(), name, is_chi_phase(ReconcilePhase::ReconcileComplete)).await;
    }

    #[tokio::test]
    async fn chi_scale_down_removes_a_host() {
        let name = "test-scale-down";
        let client = Client::try_default().await.unwrap();
        let chi_api = Api::<ClickHouseInstallation>::namespaced(client.clone(), "default");
        let sts_api = Api::<StatefulSet>::namespaced(client.clone(), "default");

        chi_api
            .create(&PostParams::default(), &minimal_chi(name, 1, 2))
            .await
            .unwrap();
        wait_for(sts_api.clone(), &stateful_set_name(name, 0, 1), is_stateful_set_ready()).await;
        let removed = sts_api.get(&stateful_set_name(name, 0, 1)).await.unwrap();

        let mut chi = chi_api.get(name).await.unwrap();
        chi.spec.configuration.clusters[0]
            .layout
            .as_mut()
            .unwrap()
            .replicas_count = Some(1);
        chi.metadata.managed_fields = None;
        chi_api
            .patch(name, &PatchParams::apply("e2e-tests").force(), &Patch::Apply(&chi))
            .await
            .unwrap();

        wait_for(
            sts_api.clone(),
            &stateful_set_name(name, 0, 1),
            conditions::is_deleted(&removed.uid().unwrap()),
        )
        .await;
    }

    #[tokio::test]
    async fn chi_stop_removes_entry_point_service() {
        let name = "test-stop";
        let client = Client::try_default().await.unwrap();
        let (chi_api, _) = setup(name).await;
        let service_api = Api::<Service>::namespaced(client.clone(), "default");
        let service = service_api.get(&service_name(name)).await.unwrap();

        let mut chi = chi_api.get(name).await.unwrap();
        chi.spec.stop = Some("yes".to_string());
        chi.metadata.managed_fields = None;
        chi_api
            .patch(name, &PatchParams::apply("e2e-tests").force(), &Patch::Apply(&chi))
            .await
            .unwrap();

        wait_for(
            service_api,
            &service_name(name),
            conditions::is_deleted(&service.uid().unwrap()),
        )
        .await;
    }

    #[tokio::test]
    async fn chi_delete_tears_down_every_owned_object() {
        let name = "test-delete";
        let (chi_api, sts_api) = setup(name).await;

        let chi = chi_api.get(name).await.unwrap();
        let sts = sts_api.get(&stateful_set_name(name, 0, 0)).await.unwrap();

        chi_api.delete(name, &Default::default()).await.unwrap();

        wait_for(
            chi_api.clone(),
            name,
            conditions::is_deleted(&chi.uid().unwrap()),
        )
        .await;
        wait_for(
            sts_api,
            &stateful_set_name(name, 0, 0),
            conditions::is_deleted(&sts.uid().unwrap()),
        )
        .await;
    }
}
