//! ---
//! smk_section: "08-simulation-models"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Bus/node network reference models."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::Duration;
use indexmap::IndexMap;
use parking_lot::Mutex;
use r_smk_kernel::{
    require_model_state, EntryPoint, Field, FieldFlags, Logger, Model, ModelState, Publication,
    Result, ScalarField, SimulationContext,
};

#[derive(Default)]
struct FabricInner {
    /// Sync counters registered by nodes, keyed by node name.
    mailboxes: IndexMap<String, Arc<ScalarField<u64>>>,
    /// Counters of the nodes a bus has attached; broadcast targets.
    attached: Vec<Arc<ScalarField<u64>>>,
}

/// The shared transmission medium bus and node models communicate over.
///
/// Created by the assembly and handed to every participating model at
/// construction; the kernel itself never sees it.
#[derive(Default)]
pub struct NetworkFabric {
    inner: Mutex<FabricInner>,
}

impl NetworkFabric {
    /// An empty fabric shared behind an `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of registered node mailboxes.
    pub fn mailbox_count(&self) -> usize {
        self.inner.lock().mailboxes.len()
    }

    /// Number of mailboxes attached by buses.
    pub fn attached_count(&self) -> usize {
        self.inner.lock().attached.len()
    }

    fn register_mailbox(&self, node: &str, counter: Arc<ScalarField<u64>>) {
        self.inner.lock().mailboxes.insert(node.to_owned(), counter);
    }

    /// Attach the named node's mailbox to the broadcast set. `false` when
    /// the node has not registered.
    fn attach(&self, node: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.mailboxes.get(node).cloned() {
            Some(counter) => {
                inner.attached.push(counter);
                true
            }
            None => false,
        }
    }

    /// Deliver one sync to every attached mailbox; returns the delivery
    /// count.
    fn broadcast_sync(&self) -> usize {
        let targets: Vec<Arc<ScalarField<u64>>> = self.inner.lock().attached.clone();
        for counter in &targets {
            counter.update(|v| v + 1);
        }
        targets.len()
    }
}

/// A network endpoint counting the syncs it receives over the bus.
///
/// The master node additionally drives the network: it registers a cyclic
/// event that broadcasts a sync over the fabric to every attached node.
pub struct NodeModel {
    name: String,
    state: ModelState,
    fabric: Arc<NetworkFabric>,
    master: bool,
    sync_period: Duration,
    sync_count: Arc<ScalarField<u64>>,
}

impl NodeModel {
    /// A non-master endpoint on `fabric`.
    pub fn new(name: impl Into<String>, fabric: Arc<NetworkFabric>) -> Self {
        Self {
            name: name.into(),
            state: ModelState::Created,
            fabric,
            master: false,
            sync_period: Duration::milliseconds(100),
            sync_count: ScalarField::new(0u64),
        }
    }

    /// A master endpoint broadcasting a sync every `sync_period`.
    pub fn master(
        name: impl Into<String>,
        fabric: Arc<NetworkFabric>,
        sync_period: Duration,
    ) -> Self {
        Self {
            master: true,
            sync_period,
            ..Self::new(name, fabric)
        }
    }

    /// Syncs received so far.
    pub fn sync_count(&self) -> u64 {
        self.sync_count.get()
    }
}

impl Model for NodeModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        if self.master {
            "network master node"
        } else {
            "network node"
        }
    }

    fn state(&self) -> ModelState {
        self.state
    }

    fn publish(&mut self, publication: &mut dyn Publication) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Created)?;
        publication.publish_field(Field::new(
            &self.name,
            "sync_count",
            "syncs received over the bus",
            FieldFlags::state_output(),
            self.sync_count.clone(),
        ))?;
        self.state = ModelState::Publishing;
        Ok(())
    }

    fn configure(&mut self, _logger: Arc<dyn Logger>) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Publishing)?;
        self.state = ModelState::Configured;
        Ok(())
    }

    fn connect(&mut self, context: &SimulationContext) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Configured)?;
        self.fabric.register_mailbox(&self.name, self.sync_count.clone());
        if self.master {
            let fabric = Arc::clone(&self.fabric);
            let logger = Arc::clone(context.logger());
            let owner = self.name.clone();
            let sync = EntryPoint::new(&self.name, "sync", move || {
                let delivered = fabric.broadcast_sync();
                logger.debug(&owner, &format!("sync broadcast to {delivered} nodes"));
            });
            context.scheduler().add_simulation_time_event(
                sync,
                self.sync_period,
                self.sync_period,
                -1,
            )?;
        }
        self.state = ModelState::Connected;
        Ok(())
    }
}

/// A bus attaching named nodes to the fabric's broadcast set.
///
/// Attachment happens during Connect, which is why assemblies list nodes
/// before the buses that reference them: fan-out order is model insertion
/// order, and a node registers its mailbox in its own Connect.
pub struct BusModel {
    name: String,
    state: ModelState,
    fabric: Arc<NetworkFabric>,
    nodes: Vec<String>,
    attached: Arc<ScalarField<u32>>,
}

impl BusModel {
    /// A bus that will attach `nodes` on `fabric`.
    pub fn new(
        name: impl Into<String>,
        fabric: Arc<NetworkFabric>,
        nodes: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            state: ModelState::Created,
            fabric,
            nodes,
            attached: ScalarField::new(0u32),
        }
    }
}

impl Model for BusModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "network bus"
    }

    fn state(&self) -> ModelState {
        self.state
    }

    fn publish(&mut self, publication: &mut dyn Publication) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Created)?;
        publication.publish_field(Field::new(
            &self.name,
            "attached",
            "nodes attached to this bus",
            FieldFlags {
                state: false,
                input: false,
                output: true,
            },
            self.attached.clone(),
        ))?;
        self.state = ModelState::Publishing;
        Ok(())
    }

    fn configure(&mut self, _logger: Arc<dyn Logger>) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Publishing)?;
        self.state = ModelState::Configured;
        Ok(())
    }

    fn connect(&mut self, context: &SimulationContext) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Configured)?;
        for node in &self.nodes {
            if self.fabric.attach(node) {
                self.attached.update(|v| v + 1);
                context
                    .logger()
                    .info(&self.name, &format!("attached node '{node}'"));
            } else {
                // A missing node is tolerated; the bus serves the rest.
                context
                    .logger()
                    .warning(&self.name, &format!("node '{node}' is not on the fabric"));
            }
        }
        self.state = ModelState::Connected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_smk_kernel::{FieldValue, Simulator};

    fn network_simulator(fabric: &Arc<NetworkFabric>) -> Simulator {
        let mut simulator = Simulator::new();
        simulator
            .add_model(Box::new(NodeModel::master(
                "node_master",
                Arc::clone(fabric),
                Duration::milliseconds(15),
            )))
            .unwrap();
        simulator
            .add_model(Box::new(NodeModel::new("node_b", Arc::clone(fabric))))
            .unwrap();
        simulator
            .add_model(Box::new(BusModel::new(
                "bus_a",
                Arc::clone(fabric),
                vec![
                    "node_master".to_owned(),
                    "node_b".to_owned(),
                    "node_missing".to_owned(),
                ],
            )))
            .unwrap();
        simulator.publish().unwrap();
        simulator.configure().unwrap();
        simulator.connect().unwrap();
        simulator.initialise().unwrap();
        simulator
    }

    #[test]
    fn master_syncs_reach_every_attached_node() {
        let fabric = NetworkFabric::new();
        let mut simulator = network_simulator(&fabric);
        assert_eq!(fabric.mailbox_count(), 2);
        assert_eq!(fabric.attached_count(), 2, "the missing node is skipped");

        simulator.run().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        simulator.hold().unwrap();

        for node in ["node_master", "node_b"] {
            let field = simulator.fields().field(node, "sync_count").unwrap();
            assert!(
                matches!(field.read(), FieldValue::U64(n) if n > 0),
                "{node} saw at least one sync"
            );
        }
        let attached = simulator.fields().field("bus_a", "attached").unwrap();
        assert_eq!(attached.read(), FieldValue::U32(2));
    }
}
