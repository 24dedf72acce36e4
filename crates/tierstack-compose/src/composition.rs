//! The unit set of one deployment plan.
//!
//! A [`Composition`] owns its units, the references binding their inputs,
//! and the dependency graph those references induce. Structural problems
//! (unknown units, duplicate bindings, cycles) surface here, before
//! anything reaches the provisioning API.

use std::fmt;
use std::sync::Arc;

use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::{Naming, StoreKey};

use crate::graph::DependencyGraph;
use crate::resolver::{Binding, OutputRef, Reference, ReferenceResolver};
use crate::unit::Unit;

/// Units, their references, and the derived dependency edges.
pub struct Composition {
    naming: Naming,
    resolver: Arc<dyn ReferenceResolver>,
    units: Vec<Unit>,
    graph: DependencyGraph,
    references: Vec<Reference>,
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("naming", &self.naming)
            .field("topology", &self.resolver.topology())
            .field("units", &self.units)
            .field("references", &self.references)
            .finish_non_exhaustive()
    }
}

impl Composition {
    /// Creates an empty composition.
    #[must_use]
    pub fn new(naming: Naming, resolver: Arc<dyn ReferenceResolver>) -> Self {
        Self {
            naming,
            resolver,
            units: Vec::new(),
            graph: DependencyGraph::new(),
            references: Vec::new(),
        }
    }

    /// Returns the naming context.
    #[must_use]
    pub const fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Returns the reference resolution strategy.
    #[must_use]
    pub fn resolver(&self) -> &dyn ReferenceResolver {
        self.resolver.as_ref()
    }

    /// Adds a unit.
    ///
    /// Inputs already bound to outputs of this unit gain their dependency
    /// edge now.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateUnit` if a unit with the same name exists,
    /// `InvalidKey` if the name cannot appear in a store key, or `NotFound`
    /// if an existing binding reads an output the unit does not declare.
    pub fn add_unit(&mut self, unit: Unit) -> Result<()> {
        if unit.name().is_empty() || unit.name().contains('/') {
            return Err(TierstackError::InvalidKey {
                key: unit.name().to_owned(),
                reason: "unit names must be non-empty and must not contain '/'",
            });
        }
        if self.graph.contains(unit.name()) {
            return Err(TierstackError::DuplicateUnit {
                name: unit.name().to_owned(),
            });
        }
        let mut consumers = Vec::new();
        let pending = self.references.iter().filter_map(|r| {
            r.source
                .as_ref()
                .filter(|s| s.unit == unit.name())
                .map(|s| (&r.consumer, s))
        });
        for (consumer, source) in pending {
            if !unit.has_output(&source.output) {
                return Err(TierstackError::NotFound {
                    kind: "output",
                    id: format!("{}.{}", source.unit, source.output),
                });
            }
            consumers.push(consumer.clone());
        }

        let _ = self.graph.add_unit(unit.name())?;
        for consumer in &consumers {
            self.graph.add_edge(consumer, unit.name())?;
        }
        tracing::debug!(unit = unit.name(), late_edges = consumers.len(), "unit added");
        self.units.push(unit);
        Ok(())
    }

    /// Binds `consumer.input` to `producer.output` and records the edge
    /// `consumer` depends on `producer`, now if the producer is in this
    /// composition or when it is added later.
    ///
    /// With a store-mediated resolver the producer may be absent: the
    /// binding is a deferred read, resolved when the consumer is deployed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown consumer, input, or (when required
    /// or present) producer output, and `Config` if the input is already bound.
    pub fn connect(
        &mut self,
        consumer: &str,
        input: &str,
        producer: &str,
        output: &str,
    ) -> Result<()> {
        self.check_input(consumer, input)?;
        let local = self.units.iter().find(|u| u.name() == producer);
        match local {
            Some(unit) if !unit.has_output(output) => {
                return Err(TierstackError::NotFound {
                    kind: "output",
                    id: format!("{producer}.{output}"),
                });
            }
            None if self.resolver.requires_local_producer() => {
                return Err(TierstackError::NotFound {
                    kind: "unit",
                    id: producer.to_owned(),
                });
            }
            _ => {}
        }
        let binding = self.resolver.bind(consumer, input, producer, output)?;
        if self.graph.contains(producer) {
            self.graph.add_edge(consumer, producer)?;
        }
        self.push_reference(
            consumer,
            input,
            binding,
            Some(OutputRef {
                unit: producer.to_owned(),
                output: output.to_owned(),
            }),
        );
        Ok(())
    }

    /// Binds `consumer.input` to a fixed value.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown consumer or input, and `Config`
    /// if the input is already bound.
    pub fn connect_literal(
        &mut self,
        consumer: &str,
        input: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        self.check_input(consumer, input)?;
        self.push_reference(
            consumer,
            input,
            Binding::Literal {
                value: value.into(),
            },
            None,
        );
        Ok(())
    }

    /// Binds `consumer.input` to an absolute store key owned outside this
    /// composition; the key is read when the consumer is deployed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown consumer or input, and `Config` if
    /// the input is already bound or the resolver has no store.
    pub fn connect_key(&mut self, consumer: &str, input: &str, key: StoreKey) -> Result<()> {
        self.check_input(consumer, input)?;
        let binding = self.resolver.bind_key(consumer, input, key)?;
        self.push_reference(consumer, input, binding, None);
        Ok(())
    }

    /// Records an explicit ordering edge with no data flowing along it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if either unit is unknown.
    pub fn add_dependency(&mut self, consumer: &str, producer: &str) -> Result<()> {
        self.graph.add_edge(consumer, producer)
    }

    fn check_input(&self, consumer: &str, input: &str) -> Result<()> {
        let unit = self.unit(consumer).ok_or_else(|| TierstackError::NotFound {
            kind: "unit",
            id: consumer.to_owned(),
        })?;
        if unit.input(input).is_none() {
            return Err(TierstackError::NotFound {
                kind: "input",
                id: format!("{consumer}.{input}"),
            });
        }
        if self
            .references
            .iter()
            .any(|r| r.consumer == consumer && r.input == input)
        {
            return Err(TierstackError::Config {
                message: format!("input \"{input}\" of unit \"{consumer}\" is already bound"),
            });
        }
        Ok(())
    }

    fn push_reference(
        &mut self,
        consumer: &str,
        input: &str,
        binding: Binding,
        source: Option<OutputRef>,
    ) {
        tracing::debug!(consumer, input, %binding, "input bound");
        self.references.push(Reference {
            consumer: consumer.to_owned(),
            input: input.to_owned(),
            binding,
            source,
        });
    }

    /// Returns the deployment order: producers before consumers, ties
    /// broken by declaration order.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` if the references form a cycle.
    pub fn compute_order(&self) -> Result<Vec<String>> {
        self.graph.compute_order()
    }

    /// Returns waves of mutually independent units.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` if the references form a cycle.
    pub fn compute_layers(&self) -> Result<Vec<Vec<String>>> {
        self.graph.compute_layers()
    }

    /// Returns the dependency graph.
    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Returns the units in declaration order.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Returns the unit named `name`.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.name() == name)
    }

    /// Returns the unit named `name` mutably.
    #[must_use]
    pub fn unit_mut(&mut self, name: &str) -> Option<&mut Unit> {
        self.units.iter_mut().find(|u| u.name() == name)
    }

    /// Returns every reference in binding order.
    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Iterates the references that fill inputs of `consumer`.
    pub fn references_for<'a>(&'a self, consumer: &'a str) -> impl Iterator<Item = &'a Reference> {
        self.references.iter().filter(move |r| r.consumer == consumer)
    }

    /// Returns `(unit, input)` pairs that have no binding yet.
    #[must_use]
    pub fn unbound_inputs(&self) -> Vec<(String, String)> {
        self.units
            .iter()
            .flat_map(|unit| {
                unit.inputs()
                    .iter()
                    .filter(|decl| {
                        !self
                            .references
                            .iter()
                            .any(|r| r.consumer == unit.name() && r.input == decl.name)
                    })
                    .map(|decl| (unit.name().to_owned(), decl.name.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tierstack_common::types::{Namespace, ValueShape};
    use tierstack_store::{MemoryStore, ParameterClient};

    use super::*;
    use crate::resolver::{DirectResolver, IndirectResolver};

    fn naming() -> Naming {
        Naming::new(Namespace::new("app").expect("ns"), "shop")
    }

    fn producer(name: &str, output: &str) -> Unit {
        let mut unit = Unit::new(name, |_| Ok(Vec::new()));
        unit.declare_output(output, |_| Ok("value".to_owned()))
            .expect("declare");
        unit
    }

    fn consumer(name: &str, input: &str) -> Unit {
        let mut unit = Unit::new(name, |_| Ok(Vec::new()));
        unit.declare_input(input, ValueShape::NonEmpty).expect("declare");
        unit
    }

    fn direct() -> Composition {
        Composition::new(naming(), Arc::new(DirectResolver::new()))
    }

    fn indirect() -> Composition {
        let client = ParameterClient::new(Arc::new(MemoryStore::new()));
        Composition::new(naming(), Arc::new(IndirectResolver::new(client, naming())))
    }

    #[test]
    fn connect_infers_dependency_edge() {
        let mut comp = direct();
        comp.add_unit(consumer("compute", "vpcId")).expect("add");
        comp.add_unit(producer("network", "id")).expect("add");
        comp.connect("compute", "vpcId", "network", "id").expect("connect");
        assert_eq!(comp.compute_order().expect("order"), vec!["network", "compute"]);
        assert_eq!(comp.references_for("compute").count(), 1);
    }

    #[test]
    fn direct_connect_requires_local_producer() {
        let mut comp = direct();
        comp.add_unit(consumer("compute", "vpcId")).expect("add");
        assert!(matches!(
            comp.connect("compute", "vpcId", "network", "id"),
            Err(TierstackError::NotFound { kind: "unit", .. })
        ));
    }

    #[test]
    fn indirect_connect_tolerates_absent_producer() {
        let mut comp = indirect();
        comp.add_unit(consumer("gateway", "serviceArn")).expect("add");
        comp.connect("gateway", "serviceArn", "compute", "serviceArn")
            .expect("deferred binding");
        assert!(comp.graph().edges().is_empty());
        assert!(matches!(
            comp.references()[0].binding,
            Binding::Deferred { .. }
        ));
    }

    #[test]
    fn producer_added_after_binding_still_orders_first() {
        let mut comp = indirect();
        comp.add_unit(consumer("gateway", "svc")).expect("add");
        comp.connect("gateway", "svc", "compute", "serviceArn")
            .expect("deferred binding");
        let mut compute = Unit::new("compute", |_| Ok(Vec::new()));
        compute
            .declare_static_output("serviceArn", "arn:aws:servicediscovery:x")
            .expect("declare");
        comp.add_unit(compute).expect("add producer");
        assert_eq!(comp.compute_order().expect("order"), vec!["compute", "gateway"]);
        assert_eq!(
            comp.graph().dependencies_of("gateway").expect("deps"),
            vec!["compute"]
        );
    }

    #[test]
    fn late_producer_must_declare_bound_output() {
        let mut comp = indirect();
        comp.add_unit(consumer("gateway", "svc")).expect("add");
        comp.connect("gateway", "svc", "compute", "serviceArn")
            .expect("deferred binding");
        assert!(matches!(
            comp.add_unit(producer("compute", "serviceId")),
            Err(TierstackError::NotFound { kind: "output", .. })
        ));
        assert!(comp.unit("compute").is_none());
        assert!(!comp.graph().contains("compute"));
    }

    #[test]
    fn connect_checks_local_producer_output() {
        let mut comp = indirect();
        comp.add_unit(consumer("compute", "vpcId")).expect("add");
        comp.add_unit(producer("network", "id")).expect("add");
        assert!(matches!(
            comp.connect("compute", "vpcId", "network", "arn"),
            Err(TierstackError::NotFound { kind: "output", .. })
        ));
    }

    #[test]
    fn input_is_bound_once() {
        let mut comp = direct();
        comp.add_unit(consumer("compute", "vpcId")).expect("add");
        comp.connect_literal("compute", "vpcId", "vpc-1").expect("first");
        assert!(matches!(
            comp.connect_literal("compute", "vpcId", "vpc-2"),
            Err(TierstackError::Config { .. })
        ));
    }

    #[test]
    fn unknown_input_is_rejected() {
        let mut comp = direct();
        comp.add_unit(consumer("compute", "vpcId")).expect("add");
        assert!(matches!(
            comp.connect_literal("compute", "subnetId", "x"),
            Err(TierstackError::NotFound { kind: "input", .. })
        ));
    }

    #[test]
    fn unit_names_must_fit_store_keys() {
        let mut comp = direct();
        assert!(comp.add_unit(consumer("a/b", "x")).is_err());
        comp.add_unit(consumer("a", "x")).expect("add");
        assert!(matches!(
            comp.add_unit(consumer("a", "y")),
            Err(TierstackError::DuplicateUnit { .. })
        ));
    }

    #[test]
    fn unbound_inputs_are_listed() {
        let mut comp = direct();
        let mut unit = consumer("compute", "vpcId");
        unit.declare_input("imageTag", ValueShape::NonEmpty)
            .expect("declare");
        comp.add_unit(unit).expect("add");
        comp.connect_literal("compute", "imageTag", "v1").expect("bind");
        assert_eq!(
            comp.unbound_inputs(),
            vec![("compute".to_owned(), "vpcId".to_owned())]
        );
    }

    #[test]
    fn cycle_is_detected_from_references() {
        let mut comp = indirect();
        for (name, input, output) in [("A", "b", "a"), ("B", "c", "b"), ("C", "a", "c")] {
            let mut unit = consumer(name, input);
            unit.declare_output(output, |_| Ok("v".to_owned()))
                .expect("declare");
            comp.add_unit(unit).expect("add");
        }
        comp.connect("A", "b", "B", "b").expect("connect");
        comp.connect("B", "c", "C", "c").expect("connect");
        comp.connect("C", "a", "A", "a").expect("connect");
        match comp.compute_order() {
            Err(TierstackError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["A", "B", "C"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }
}
