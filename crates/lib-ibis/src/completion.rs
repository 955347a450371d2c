//! Data completion: resolve defaults, link pins, validate references.
//!
//! [`complete`] turns a freshly loaded graph into a fully resolved one, in
//! place. The passes run in a fixed order:
//!
//! 1. Global defaults fill unset model slots; a ramp is created where
//!    missing.
//! 2. A model with no voltage range but fully set pull-up and pull-down
//!    references gets `pullup - pulldown`.
//! 3. Pins are linked to models by case-insensitive name; a component's
//!    netlist is handed to models that lack one.
//! 4. Component overrides fill whatever is still unset on the models that
//!    component uses. Simulation time still unset after this falls back to
//!    10 ns.
//! 5. Package parasitics are pushed down to every pin.
//! 6. Unresolved model and companion-pin references are reported.
//!
//! Because every pass only fills unset slots, an explicit model value always
//! survives and running the whole thing twice changes nothing.
//!
//! Missing references are never fatal here. They are collected in the
//! [`CompletionReport`] so one run shows every defect; the caller decides
//! what to do with them.

use crate::error::LinkError;
use lib_types::{
    find_model_in, fill_scalar, scalar_is_unset, GlobalDefaults, IbisGraph, ModelId, Pin,
    PinLink, Ramp, Seconds,
};
use std::collections::BTreeSet;

/// Simulation time used when neither the model nor the globals set one.
pub const DEFAULT_SIM_TIME: Seconds = Seconds(10e-9);

/// Outcome of a completion run.
#[derive(Clone, Debug, Default)]
pub struct CompletionReport {
    /// Unresolved references, in discovery order.
    pub errors: Vec<LinkError>,

    /// Slots and scalars filled in by inheritance.
    pub filled_slots: usize,

    /// Pins successfully linked to a model.
    pub linked_pins: usize,
}

impl CompletionReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Resolve `graph` in place against `globals`.
pub fn complete(globals: &GlobalDefaults, graph: &mut IbisGraph) -> CompletionReport {
    let mut report = CompletionReport::default();

    inherit_globals(globals, graph, &mut report);
    derive_voltage_ranges(graph);
    link_pins(graph, &mut report);
    apply_component_overrides(graph, &mut report);
    apply_sim_time_fallback(graph);
    propagate_parasitics(globals, graph, &mut report);
    validate(graph, &mut report);

    tracing::info!(
        "Completion: {} models, {} pins linked, {} slots filled, {} errors",
        graph.models.len(),
        report.linked_pins,
        report.filled_slots,
        report.errors.len()
    );

    report
}

fn inherit_globals(globals: &GlobalDefaults, graph: &mut IbisGraph, report: &mut CompletionReport) {
    for model in graph.models.iter_mut() {
        report.filled_slots += model.electrical.inherit_from(&globals.electrical);

        if model.ramp.is_none() {
            let mut ramp = Ramp::default();
            fill_scalar(&mut ramp.derate_pct, globals.electrical.derate_ramp_pct);
            model.ramp = Some(ramp);
        }
    }
}

fn derive_voltage_ranges(graph: &mut IbisGraph) {
    for model in graph.models.iter_mut() {
        let e = &mut model.electrical;
        if e.voltage_range.is_unset() && e.pullup_ref.is_fully_set() && e.pulldown_ref.is_fully_set()
        {
            e.voltage_range = e.pullup_ref - e.pulldown_ref;
            tracing::debug!(
                "Model '{}': voltage range derived from references: {}",
                model.name,
                e.voltage_range
            );
        }
    }
}

fn link_pins(graph: &mut IbisGraph, report: &mut CompletionReport) {
    let IbisGraph { models, components } = graph;

    for component in components.iter_mut() {
        for pin in component.pins.iter_mut() {
            pin.link = match PinLink::reserved(&pin.model_name) {
                Some(reserved) => reserved,
                None => find_model_in(models, &pin.model_name)
                    .map_or(PinLink::Unresolved, PinLink::Linked),
            };

            let PinLink::Linked(id) = pin.link else {
                continue;
            };
            report.linked_pins += 1;

            let model = &mut models[id.0];
            if model.spice_file.is_none() {
                if let Some(file) = &component.spice_file {
                    tracing::debug!(
                        "Model '{}' takes netlist {:?} from component '{}'",
                        model.name,
                        file,
                        component.name
                    );
                    model.spice_file = Some(file.clone());
                }
            }
        }
    }
}

fn apply_component_overrides(graph: &mut IbisGraph, report: &mut CompletionReport) {
    let IbisGraph { models, components } = graph;

    for component in components.iter() {
        let used: BTreeSet<ModelId> = component.pins.iter().filter_map(Pin::linked_model).collect();

        for id in used {
            let model = &mut models[id.0];
            let filled = model.electrical.inherit_from(&component.overrides);
            if filled > 0 {
                tracing::debug!(
                    "Model '{}': {} slots filled from component '{}' overrides",
                    model.name,
                    filled,
                    component.name
                );
            }
            report.filled_slots += filled;
        }
    }
}

fn apply_sim_time_fallback(graph: &mut IbisGraph) {
    for model in graph.models.iter_mut() {
        if scalar_is_unset(model.electrical.sim_time) {
            model.electrical.sim_time = DEFAULT_SIM_TIME.0;
        }
    }
}

fn propagate_parasitics(
    globals: &GlobalDefaults,
    graph: &mut IbisGraph,
    report: &mut CompletionReport,
) {
    for component in graph.components.iter_mut() {
        let source = component.parasitics.as_ref().unwrap_or(&globals.parasitics);

        for pin in component.pins.iter_mut() {
            match pin.parasitics.as_mut() {
                Some(existing) => report.filled_slots += existing.fill_from(source),
                None => pin.parasitics = Some(source.clone()),
            }
        }
    }
}

fn validate(graph: &IbisGraph, report: &mut CompletionReport) {
    for component in &graph.components {
        for pin in &component.pins {
            if pin.link == PinLink::Unresolved {
                let err = LinkError::UnresolvedModel {
                    component: component.name.clone(),
                    pin: pin.name.clone(),
                    model: pin.model_name.trim().to_string(),
                };
                tracing::error!("{}", err);
                report.errors.push(err);
            }

            for (kind, target) in pin.companions() {
                if component.find_pin(target).is_some() {
                    continue;
                }
                let err = LinkError::UnresolvedCompanion {
                    component: component.name.clone(),
                    pin: pin.name.clone(),
                    kind,
                    target: target.to_string(),
                };
                tracing::error!("{}", err);
                report.errors.push(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::{
        CompanionKind, Component, Electrical, Model, ModelType, PinParasitics, TypMinMax,
    };
    use std::path::PathBuf;

    fn globals() -> GlobalDefaults {
        GlobalDefaults {
            electrical: Electrical {
                voltage_range: TypMinMax::new(3.3, 3.0, 3.6),
                temp_range: TypMinMax::new(27.0, 100.0, 0.0),
                vil: TypMinMax::new(0.8, 0.8, 0.8),
                r_load: 50.0,
                derate_ramp_pct: 5.0,
                ..Default::default()
            },
            parasitics: PinParasitics::new(
                TypMinMax::new(0.2, 0.1, 0.3),
                TypMinMax::new(2e-9, 1e-9, 3e-9),
                TypMinMax::new(1e-12, 0.5e-12, 1.5e-12),
            ),
        }
    }

    fn graph() -> IbisGraph {
        let mut io = Model::new("dq_io", ModelType::IO);
        io.electrical.voltage_range = TypMinMax::new(1.8, 1.7, 1.9);

        let input = Model::new("oe_in", ModelType::Input);

        let mut chip = Component::new("CHIP");
        chip.spice_file = Some(PathBuf::from("chip.sp"));
        chip.overrides.c_comp = TypMinMax::new(2e-12, 1.8e-12, 2.2e-12);
        chip.overrides.voltage_range = TypMinMax::new(2.5, 2.3, 2.7);

        let mut dq = Pin::new("1", "DQ0", "DQ_IO");
        dq.enable_pin = Some("2".into());
        chip.pins = vec![
            dq,
            Pin::new("2", "OE", "oe_in"),
            Pin::new("3", "VDD", "POWER"),
            Pin::new("4", "VSS", "GND"),
            Pin::new("5", "NC", "NC"),
        ];

        IbisGraph::new(vec![io, input], vec![chip])
    }

    #[test]
    fn test_resolves_clean_graph() {
        let mut g = graph();
        let report = complete(&globals(), &mut g);

        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(report.linked_pins, 2);

        let pins = &g.components[0].pins;
        assert_eq!(pins[0].link, PinLink::Linked(ModelId(0)));
        assert_eq!(pins[1].link, PinLink::Linked(ModelId(1)));
        assert_eq!(pins[2].link, PinLink::PowerRail);
        assert_eq!(pins[3].link, PinLink::Ground);
        assert_eq!(pins[4].link, PinLink::NoConnect);
    }

    #[test]
    fn test_explicit_model_value_survives() {
        let mut g = graph();
        complete(&globals(), &mut g);

        // Model set 1.8 V; neither globals (3.3) nor component (2.5) win.
        assert_eq!(g.models[0].electrical.voltage_range.slots(), [1.8, 1.7, 1.9]);
        // Globals beat the component override for slots both set.
        assert_eq!(g.models[1].electrical.voltage_range.slots(), [3.3, 3.0, 3.6]);
    }

    #[test]
    fn test_component_override_fills_unset_global() {
        let mut g = graph();
        complete(&globals(), &mut g);

        // c_comp is unset globally, so the component's value lands.
        for model in &g.models {
            assert_eq!(model.electrical.c_comp.slots(), [2e-12, 1.8e-12, 2.2e-12]);
        }
    }

    #[test]
    fn test_scalars_and_defaults() {
        let mut g = graph();
        g.models[0].electrical.r_load = 0.0;
        complete(&globals(), &mut g);

        let model = &g.models[0];
        assert_eq!(model.electrical.r_load, 50.0);
        assert_eq!(model.electrical.sim_time, DEFAULT_SIM_TIME.0);
        assert_eq!(model.ramp.as_ref().map(|r| r.derate_pct), Some(5.0));
        assert_eq!(model.spice_file.as_deref(), Some(PathBuf::from("chip.sp").as_path()));
    }

    #[test]
    fn test_component_sim_time_beats_fallback() {
        let mut g = graph();
        g.components[0].overrides.sim_time = 20e-9;
        complete(&GlobalDefaults::default(), &mut g);

        // Both models are used by CHIP, so neither takes the 10 ns fallback.
        for model in &g.models {
            assert_eq!(model.electrical.sim_time, 20e-9);
        }

        // An unused model still gets the fallback.
        let mut g = graph();
        g.components[0].overrides.sim_time = 20e-9;
        g.models.push(Model::new("spare", ModelType::Output));
        complete(&GlobalDefaults::default(), &mut g);
        assert_eq!(g.models[2].electrical.sim_time, DEFAULT_SIM_TIME.0);
    }

    #[test]
    fn test_derived_voltage_range() {
        let mut model = Model::new("drv", ModelType::Output);
        model.electrical.pullup_ref = TypMinMax::new(3.3, 3.0, 3.6);
        model.electrical.pulldown_ref = TypMinMax::new(0.3, 0.0, 0.6);
        let mut g = IbisGraph::new(vec![model], vec![]);

        complete(&GlobalDefaults::default(), &mut g);
        let vr = g.models[0].electrical.voltage_range;
        assert!((vr.typ - 3.0).abs() < 1e-12);
        assert!((vr.min - 3.0).abs() < 1e-12);
        assert!((vr.max - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_reference_does_not_derive() {
        let mut model = Model::new("drv", ModelType::Output);
        model.electrical.pullup_ref = TypMinMax::typ_only(3.3);
        model.electrical.pulldown_ref = TypMinMax::new(0.0, 0.0, 0.0);
        let mut g = IbisGraph::new(vec![model], vec![]);

        complete(&GlobalDefaults::default(), &mut g);
        assert!(g.models[0].electrical.voltage_range.is_unset());
    }

    #[test]
    fn test_parasitics_component_then_global() {
        let mut g = graph();
        let own = PinParasitics::new(
            TypMinMax::typ_only(0.5),
            TypMinMax::UNSET,
            TypMinMax::UNSET,
        );
        g.components[0].pins[0].parasitics = Some(own);
        complete(&globals(), &mut g);

        let pins = &g.components[0].pins;
        let dq = pins[0].parasitics.as_ref().unwrap();
        assert_eq!(dq.r_pkg.slots(), [0.5, 0.1, 0.3]);
        assert_eq!(dq.l_pkg.slots(), [2e-9, 1e-9, 3e-9]);

        // No component parasitics: every other pin gets a copy of the globals.
        assert!(pins[1].parasitics.as_ref().unwrap().same_as(&globals().parasitics));

        let mut g = graph();
        let pkg = PinParasitics::new(
            TypMinMax::typ_only(1.0),
            TypMinMax::typ_only(1e-9),
            TypMinMax::typ_only(1e-12),
        );
        g.components[0].parasitics = Some(pkg.clone());
        complete(&globals(), &mut g);
        assert!(g.components[0].pins[1].parasitics.as_ref().unwrap().same_as(&pkg));
    }

    #[test]
    fn test_second_pass_is_noop() {
        let mut g = graph();
        complete(&globals(), &mut g);
        let first = g.clone();

        let report = complete(&globals(), &mut g);
        assert_eq!(report.filled_slots, 0);

        for (a, b) in first.models.iter().zip(&g.models) {
            assert!(a.electrical.same_as(&b.electrical), "model '{}' changed", a.name);
            assert_eq!(a.spice_file, b.spice_file);
        }
        for (a, b) in first.components[0].pins.iter().zip(&g.components[0].pins) {
            assert_eq!(a.link, b.link);
            let (pa, pb) = (a.parasitics.as_ref().unwrap(), b.parasitics.as_ref().unwrap());
            assert!(pa.same_as(pb));
        }
    }

    #[test]
    fn test_collects_every_link_error() {
        let mut g = graph();
        g.components[0].pins[0].model_name = "missing_model".into();
        g.components[0].pins[1].enable_pin = Some("99".into());

        let report = complete(&globals(), &mut g);

        assert_eq!(report.errors.len(), 2);
        assert_eq!(
            report.errors[0],
            LinkError::UnresolvedModel {
                component: "CHIP".into(),
                pin: "1".into(),
                model: "missing_model".into(),
            }
        );
        assert!(matches!(
            &report.errors[1],
            LinkError::UnresolvedCompanion { kind: CompanionKind::Enable, target, .. } if target == "99"
        ));

        // Defective pins stay in the graph.
        assert_eq!(g.components[0].pins.len(), 5);
        assert_eq!(g.components[0].pins[0].link, PinLink::Unresolved);
    }
}
