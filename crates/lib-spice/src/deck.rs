//! Correlation deck assembly and execution.
//!
//! A correlation run puts the transistor-level buffer behind three
//! instances: a driver into a lossy line, a driver into a resistive load,
//! and a disabled receiver at the far end of the line. The rendered deck is
//! handed to a [`SimulatorRunner`]; its transient output is later compared
//! against the behavioral model.
//!
//! Only I/O and 3-state models are correlated. Everything else, and any
//! model without a netlist, comes back [`CorrelationStatus::Skipped`].

use crate::error::{SpiceError, SpiceResult};
use crate::netlist::{prepare_subcircuit, SubcircuitDescriptor};
use crate::runner::SimulatorRunner;
use lib_types::{
    format_si, scalar_is_unset, write_atomic, Component, Enable, IbisGraph, Model, ModelId,
    Ohms, Pin, PinLink, Seconds, Volts,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SUPPLY_HIGH_NAMES: &[&str] = &["vdd", "vcc", "vddio"];
const SUPPLY_LOW_NAMES: &[&str] = &["vss", "gnd", "0", "vssio"];

const INPUT_SYNONYMS: &[&str] = &["in", "data", "d", "a"];
const ENABLE_SYNONYMS: &[&str] = &["oe", "en", "enable", "tri"];
const OUTPUT_SYNONYMS: &[&str] = &["out", "pad", "io", "y", "q"];

/// Number of parallel buffer instances in a deck.
pub const INSTANCE_COUNT: usize = 3;

const BUILTIN_TEMPLATE: &str = "\
* Correlation deck for model {{model}}
* Generated by ibis-forge
.option post=2 probe
.temp {{temp}}
{{include}}
* subcircuit {{subckt}}: {{pins}}

Vpu {{pullup}} 0 {{vcc}}
Vpd {{pulldown}} 0 0
{{enable_sources}}
Vin1 in1 0 PULSE(0 {{vcc}} {{delay}} {{tr}} {{tf}} {{width}} {{period}})
Vin2 in2 0 PULSE(0 {{vcc}} {{delay}} {{tr}} {{tf}} {{width}} {{period}})
Vin3 in3 0 0

{{instances}}

W1 out1 0 out3 0 RLGCfile='{{tline_file}}' N=1 L=0.1
Rload out2 0 {{r_load}}

.tran {{step}} {{sim_time}}
.probe tran {{probes}}
.end
";

/// Parameterized deck text with `{{key}}` placeholders.
#[derive(Clone, Debug)]
pub struct DeckTemplate {
    text: String,
}

impl Default for DeckTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DeckTemplate {
    pub fn builtin() -> Self {
        Self {
            text: BUILTIN_TEMPLATE.to_string(),
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn from_file(path: &Path) -> SpiceResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SpiceError::io(path, e))?;
        Ok(Self { text })
    }

    /// Substitute every placeholder; an unknown one is an error.
    pub fn render(&self, values: &BTreeMap<&str, String>) -> SpiceResult<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let close = after
                .find("}}")
                .ok_or_else(|| SpiceError::Template("unterminated '{{' placeholder".into()))?;
            let key = after[..close].trim();
            let value = values
                .get(key)
                .ok_or_else(|| SpiceError::Template(format!("no value for placeholder '{}'", key)))?;
            out.push_str(value);
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Picks the supply rails feeding a pin.
pub trait SupplyResolver: Send + Sync {
    /// (pull-up rail, pull-down rail); `None` when nothing suitable is found.
    fn resolve(&self, component: &Component, pin: &Pin) -> (Option<String>, Option<String>);
}

/// Uses the component's pin mapping, then the nearest POWER/GND pin.
#[derive(Clone, Copy, Debug, Default)]
pub struct NearestRailResolver;

impl NearestRailResolver {
    fn nearest(component: &Component, pin: &Pin, rail: PinLink) -> Option<String> {
        let here = component.pins.iter().position(|p| p.name == pin.name)?;
        component
            .pins
            .iter()
            .enumerate()
            .filter(|(_, p)| p.link == rail)
            .min_by_key(|(i, _)| i.abs_diff(here))
            .map(|(_, p)| p.signal_name.clone())
    }
}

impl SupplyResolver for NearestRailResolver {
    fn resolve(&self, component: &Component, pin: &Pin) -> (Option<String>, Option<String>) {
        let mapping = component.mapping_for(&pin.name);
        let pullup = mapping
            .and_then(|m| m.pullup_ref.clone())
            .or_else(|| Self::nearest(component, pin, PinLink::PowerRail));
        let pulldown = mapping
            .and_then(|m| m.pulldown_ref.clone())
            .or_else(|| Self::nearest(component, pin, PinLink::Ground));
        (pullup, pulldown)
    }
}

/// Rails used for one deck, spelled as the subcircuit declares them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupplyPins {
    pub pullup: String,
    pub pulldown: String,
}

impl SupplyPins {
    pub fn is_rail(&self, pin: &str) -> bool {
        pin.eq_ignore_ascii_case(&self.pullup) || pin.eq_ignore_ascii_case(&self.pulldown)
    }
}

/// Positions tried, in order, for a role no synonym matched.
const FALLBACK_POSITIONS: [usize; 3] = [0, 1, 2];

/// Port positions of the buffer's signal roles; `None` leaves a role unwired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PinRoles {
    pub input: Option<usize>,
    pub enable: Option<usize>,
    pub output: Option<usize>,
    pub sense: Option<usize>,
}

fn is_one_of(pin: &str, names: &[&str]) -> bool {
    names.iter().any(|n| pin.eq_ignore_ascii_case(n))
}

fn position_in(pins: &[String], names: &[&str]) -> Option<usize> {
    pins.iter().position(|p| is_one_of(p, names))
}

fn claim(pins: &[String], taken: &mut [bool], matches: impl Fn(&str) -> bool) -> Option<usize> {
    let i = (0..pins.len()).find(|&i| !taken[i] && matches(&pins[i]))?;
    taken[i] = true;
    Some(i)
}

fn claim_fallback(taken: &mut [bool]) -> Option<usize> {
    let i = FALLBACK_POSITIONS
        .into_iter()
        .find(|&i| taken.get(i).is_some_and(|t| !t))?;
    taken[i] = true;
    Some(i)
}

impl PinRoles {
    /// Rail ports are reserved first and never take a role. Synonym matches
    /// come next; a role left over takes the first free position of 0, 1, 2.
    /// Every port carries at most one role.
    pub fn assign(pins: &[String], supplies: &SupplyPins) -> Self {
        let mut taken: Vec<bool> = pins.iter().map(|p| supplies.is_rail(p)).collect();
        let mut input = claim(pins, &mut taken, |p| is_one_of(p, INPUT_SYNONYMS));
        let mut enable = claim(pins, &mut taken, |p| is_one_of(p, ENABLE_SYNONYMS));
        let mut output = claim(pins, &mut taken, |p| is_one_of(p, OUTPUT_SYNONYMS));
        let sense = claim(pins, &mut taken, |p| p.to_ascii_lowercase().contains("sense"));

        for role in [&mut input, &mut enable, &mut output] {
            if role.is_none() {
                *role = claim_fallback(&mut taken);
            }
        }

        Self {
            input,
            enable,
            output,
            sense,
        }
    }
}

fn pick_supply(resolved: Option<String>, pins: &[String], fallback: &[&str], default: &str) -> String {
    let declared = |name: &str| pins.iter().find(|p| p.eq_ignore_ascii_case(name)).cloned();

    resolved
        .as_deref()
        .and_then(declared)
        .or_else(|| position_in(pins, fallback).map(|i| pins[i].clone()))
        .or(resolved)
        .unwrap_or_else(|| default.to_string())
}

/// Resolve the rails for `model` from the first pin linked to it.
pub fn resolve_supplies(
    graph: &IbisGraph,
    id: ModelId,
    pins: &[String],
    resolver: &dyn SupplyResolver,
) -> SupplyPins {
    let (pullup, pulldown) = graph
        .pins_linked_to(id)
        .next()
        .map(|(component, pin)| resolver.resolve(component, pin))
        .unwrap_or((None, None));

    SupplyPins {
        pullup: pick_supply(pullup, pins, SUPPLY_HIGH_NAMES, "vdd"),
        pulldown: pick_supply(pulldown, pins, SUPPLY_LOW_NAMES, "0"),
    }
}

/// High time of the stimulus pulse: half the period less the rise time,
/// never negative.
fn pulse_width(model: &str, period: f64, tr: f64) -> f64 {
    let width = period / 2.0 - tr;
    if width < 0.0 {
        tracing::warn!(
            "Model '{}': rise time {} exceeds half the stimulus period {}; pulse width clamped to 0",
            model,
            format_si(tr),
            format_si(period)
        );
        return 0.0;
    }
    width
}

/// One instance line, `X<k> <nodes...> <subckt>`.
pub fn instance_line(k: usize, subckt: &SubcircuitDescriptor, roles: &PinRoles, supplies: &SupplyPins) -> String {
    let nodes: Vec<String> = subckt
        .pins
        .iter()
        .enumerate()
        .map(|(i, pin)| {
            if pin.eq_ignore_ascii_case(&supplies.pullup) {
                supplies.pullup.clone()
            } else if pin.eq_ignore_ascii_case(&supplies.pulldown) {
                supplies.pulldown.clone()
            } else if Some(i) == roles.input {
                format!("in{}", k)
            } else if Some(i) == roles.enable {
                format!("en{}", k)
            } else if Some(i) == roles.output {
                format!("out{}", k)
            } else if Some(i) == roles.sense {
                format!("sense{}", k)
            } else {
                format!("{}_{}", pin, k)
            }
        })
        .collect();

    format!("X{} {} {}", k, nodes.join(" "), subckt.name)
}

/// Enable sources: instances 1 and 2 drive, instance 3 receives.
fn enable_sources(enable: Enable) -> String {
    let (on, off) = match enable {
        Enable::ActiveHigh => ("{{vcc}}", "0"),
        Enable::ActiveLow => ("0", "{{vcc}}"),
    };
    (1..=INSTANCE_COUNT)
        .map(|k| format!("Ven{} en{} 0 {}", k, k, if k < INSTANCE_COUNT { on } else { off }))
        .collect::<Vec<_>>()
        .join("\n")
}

/// File-system friendly form of a model name.
pub fn deck_stem(model: &Model) -> String {
    let name: String = model
        .name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("corr_{}", name)
}

fn typ_or(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value
    }
}

/// Run-wide settings shared by every model's deck.
pub struct CorrelationContext {
    pub template: DeckTemplate,
    pub tline_file: PathBuf,
    pub resolver: Box<dyn SupplyResolver>,
}

impl CorrelationContext {
    pub fn new(template: DeckTemplate, tline_file: impl Into<PathBuf>) -> Self {
        Self {
            template,
            tline_file: tline_file.into(),
            resolver: Box::new(NearestRailResolver),
        }
    }
}

/// Outcome of one model's correlation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CorrelationStatus {
    /// Not eligible.
    Skipped { reason: String },

    /// Deck written, no simulator supplied.
    Rendered,

    /// Simulator exited zero.
    Completed { waveform: PathBuf },

    /// Simulator exited non-zero or timed out.
    SimulatorFailed { code: i32, log: PathBuf },

    /// Netlist preparation, rendering or launch failed.
    Failed { message: String },
}

impl CorrelationStatus {
    /// Zero for success and skips, the simulator's code for failures, `-1`
    /// for everything else.
    pub fn code(&self) -> i32 {
        match self {
            Self::Skipped { .. } | Self::Rendered | Self::Completed { .. } => 0,
            Self::SimulatorFailed { code, .. } => *code,
            Self::Failed { .. } => -1,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SimulatorFailed { .. } | Self::Failed { .. })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CorrelationResult {
    pub model: String,
    pub status: CorrelationStatus,

    /// Deck path, if one was written.
    pub deck: Option<PathBuf>,
}

/// Render and write the deck for `id` into `output_dir`.
pub fn render_deck(
    graph: &IbisGraph,
    id: ModelId,
    ctx: &CorrelationContext,
    output_dir: &Path,
) -> SpiceResult<PathBuf> {
    let model = graph.model(id);
    let netlist = model
        .spice_file
        .as_deref()
        .ok_or_else(|| SpiceError::Template(format!("model '{}' has no netlist", model.name)))?;

    let stem = deck_stem(model);
    let subckt = prepare_subcircuit(netlist, &format!("{}_buf", stem), output_dir)?;
    let supplies = resolve_supplies(graph, id, &subckt.pins, ctx.resolver.as_ref());
    let roles = PinRoles::assign(&subckt.pins, &supplies);
    for (role, position) in [("input", roles.input), ("enable", roles.enable), ("output", roles.output)] {
        if position.is_none() {
            tracing::warn!(
                "Model '{}': no free port for the {} role in {:?}; left unwired",
                model.name,
                role,
                subckt.pins
            );
        }
    }
    tracing::debug!(
        "Model '{}': subckt {} pins {:?}, roles {:?}, supplies {:?}",
        model.name,
        subckt.name,
        subckt.pins,
        roles,
        supplies
    );

    let e = &model.electrical;
    let vcc = typ_or(e.voltage_range.typ, 3.3);
    let tr = typ_or(e.tr.typ, Seconds::from_ps(100.0).0);
    let tf = typ_or(e.tf.typ, Seconds::from_ps(100.0).0);
    let sim_time = if scalar_is_unset(e.sim_time) { Seconds::from_ns(10.0).0 } else { e.sim_time };
    let r_load = if scalar_is_unset(e.r_load) { 50.0 } else { e.r_load };
    let period = sim_time / 2.0;

    let instances: Vec<String> = (1..=INSTANCE_COUNT)
        .map(|k| instance_line(k, &subckt, &roles, &supplies))
        .collect();

    let mut probes: Vec<String> = vec!["v(in1)".into()];
    probes.extend((1..=INSTANCE_COUNT).map(|k| format!("v(out{})", k)));
    if roles.sense.is_some() {
        probes.extend((1..=INSTANCE_COUNT).map(|k| format!("v(sense{})", k)));
    }

    // Enable sources reference {{vcc}}, so they are substituted first.
    let enable = DeckTemplate::from_text(enable_sources(model.enable));

    let mut values = BTreeMap::new();
    values.insert("vcc", Volts(vcc).to_string());
    let enable = enable.render(&values)?;
    values.insert("enable_sources", enable);
    values.insert("model", model.name.clone());
    values.insert("temp", format_si(typ_or(e.temp_range.typ, 27.0)));
    values.insert("include", subckt.include_directive());
    values.insert("subckt", subckt.name.clone());
    values.insert("pins", subckt.pins.join(" "));
    values.insert("pullup", supplies.pullup.clone());
    values.insert("pulldown", supplies.pulldown.clone());
    values.insert("delay", format_si(period / 4.0));
    values.insert("tr", format_si(tr));
    values.insert("tf", format_si(tf));
    values.insert("width", format_si(pulse_width(&model.name, period, tr)));
    values.insert("period", format_si(period));
    values.insert("instances", instances.join("\n"));
    values.insert("tline_file", ctx.tline_file.display().to_string());
    values.insert("r_load", Ohms(r_load).to_string());
    values.insert("step", Seconds(sim_time / 1000.0).to_string());
    values.insert("sim_time", Seconds(sim_time).to_string());
    values.insert("probes", probes.join(" "));

    let text = ctx.template.render(&values)?;
    let deck = output_dir.join(format!("{}.sp", stem));
    write_atomic(&deck, text.as_bytes()).map_err(|e| SpiceError::io(&deck, e))?;
    tracing::info!("Model '{}': wrote correlation deck {:?}", model.name, deck);
    Ok(deck)
}

/// Build, and optionally run, the correlation deck for one model.
///
/// Never returns `Err`: every failure is folded into the result status.
pub fn build_correlation(
    graph: &IbisGraph,
    id: ModelId,
    ctx: &CorrelationContext,
    output_dir: &Path,
    runner: Option<&dyn SimulatorRunner>,
) -> CorrelationResult {
    let model = graph.model(id);
    let result = |status, deck| CorrelationResult {
        model: model.name.clone(),
        status,
        deck,
    };

    if !model.model_type.is_bidirectional() {
        let reason = format!("model type {} is not I/O or 3-state", model.model_type);
        tracing::debug!("Model '{}': skipped, {}", model.name, reason);
        return result(CorrelationStatus::Skipped { reason }, None);
    }
    if model.spice_file.is_none() {
        tracing::warn!("Model '{}': skipped, no netlist", model.name);
        return result(CorrelationStatus::Skipped { reason: "no netlist".into() }, None);
    }

    let deck = match render_deck(graph, id, ctx, output_dir) {
        Ok(deck) => deck,
        Err(e) => {
            tracing::error!("Model '{}': deck preparation failed: {}", model.name, e);
            return result(CorrelationStatus::Failed { message: e.to_string() }, None);
        }
    };

    let Some(runner) = runner else {
        return result(CorrelationStatus::Rendered, Some(deck));
    };

    let output_base = output_dir.join(deck_stem(model));
    let status = match runner.run(&deck, &output_base) {
        Ok(out) => {
            tracing::info!("Model '{}': correlation run completed in {:?}", model.name, out.elapsed);
            CorrelationStatus::Completed { waveform: out.waveform }
        }
        Err(e @ (SpiceError::Simulation { .. } | SpiceError::Timeout { .. })) => {
            let log = runner.log_path(&output_base);
            tracing::error!("Model '{}': {} (log {:?})", model.name, e, log);
            CorrelationStatus::SimulatorFailed {
                code: e.status_code(),
                log,
            }
        }
        Err(e) => {
            tracing::error!("Model '{}': {}", model.name, e);
            CorrelationStatus::Failed { message: e.to_string() }
        }
    };

    result(status, Some(deck))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunOutput;
    use lib_types::{ModelType, PinMapping};
    use std::time::Duration;

    fn descriptor(pins: &[&str]) -> SubcircuitDescriptor {
        SubcircuitDescriptor {
            name: "buf".into(),
            pins: pins.iter().map(|p| p.to_string()).collect(),
            source: PathBuf::from("buf.sp"),
            synthesized: true,
        }
    }

    #[test]
    fn test_template_render() {
        let template = DeckTemplate::from_text("a {{x}} b {{ y }}");
        let mut values = BTreeMap::new();
        values.insert("x", "1".to_string());
        values.insert("y", "2".to_string());
        assert_eq!(template.render(&values).unwrap(), "a 1 b 2");

        let missing = DeckTemplate::from_text("{{z}}").render(&values);
        assert!(matches!(missing, Err(SpiceError::Template(_))));
        let open = DeckTemplate::from_text("{{x").render(&values);
        assert!(matches!(open, Err(SpiceError::Template(_))));
    }

    fn rails(pullup: &str, pulldown: &str) -> SupplyPins {
        SupplyPins { pullup: pullup.into(), pulldown: pulldown.into() }
    }

    #[test]
    fn test_roles_and_instance() {
        let subckt = descriptor(&["DATA", "tri", "pad", "pad_sense", "VDDQ", "vss"]);
        let supplies = rails("VDDQ", "vss");
        let roles = PinRoles::assign(&subckt.pins, &supplies);
        assert_eq!(
            roles,
            PinRoles { input: Some(0), enable: Some(1), output: Some(2), sense: Some(3) }
        );
        assert_eq!(
            instance_line(2, &subckt, &roles, &supplies),
            "X2 in2 en2 out2 sense2 VDDQ vss buf"
        );

        // No synonyms: fixed positions.
        let roles = PinRoles::assign(&descriptor(&["a1", "b1", "c1"]).pins, &rails("vdd", "0"));
        assert_eq!(
            roles,
            PinRoles { input: Some(0), enable: Some(1), output: Some(2), sense: None }
        );
    }

    #[test]
    fn test_rails_never_take_a_role() {
        let supplies = rails("vdd", "vss");

        // Supply-only wrapper: nothing to drive, both rails stay rails.
        let bare = descriptor(&["vdd", "vss"]);
        let roles = PinRoles::assign(&bare.pins, &supplies);
        assert_eq!(roles, PinRoles::default());
        assert_eq!(instance_line(1, &bare, &roles, &supplies), "X1 vdd vss buf");

        // Rails sit on fallback positions 1 and 2.
        let one = descriptor(&["pad", "vdd", "vss"]);
        let roles = PinRoles::assign(&one.pins, &supplies);
        assert_eq!(roles.output, Some(0));
        assert_eq!((roles.input, roles.enable), (None, None));
        assert_eq!(instance_line(1, &one, &roles, &supplies), "X1 out1 vdd vss buf");
    }

    #[test]
    fn test_roles_do_not_collide() {
        // Output matches at 0, where the input fallback would also land.
        let subckt = descriptor(&["pad", "n1", "n2", "vdd", "vss"]);
        let supplies = rails("vdd", "vss");
        let roles = PinRoles::assign(&subckt.pins, &supplies);
        assert_eq!(
            roles,
            PinRoles { input: Some(1), enable: Some(2), output: Some(0), sense: None }
        );
        assert_eq!(
            instance_line(3, &subckt, &roles, &supplies),
            "X3 out3 in3 en3 vdd vss buf"
        );
    }

    #[test]
    fn test_pulse_width_not_negative() {
        assert!((pulse_width("DQ", 5e-9, 1e-10) - 2.4e-9).abs() < 1e-18);
        // 1 ns rise against a 1 ns period.
        assert_eq!(pulse_width("DQ", 1e-9, 1e-9), 0.0);
    }

    fn graph_with(component: Component, model: Model) -> IbisGraph {
        let mut graph = IbisGraph::new(vec![model], vec![component]);
        for pin in graph.components[0].pins.iter_mut() {
            pin.link = PinLink::reserved(&pin.model_name)
                .unwrap_or(PinLink::Linked(ModelId(0)));
        }
        graph
    }

    #[test]
    fn test_supply_resolution() {
        let mut chip = Component::new("CHIP");
        chip.pins = vec![
            Pin::new("1", "VDDQ", "POWER"),
            Pin::new("2", "DQ0", "dq"),
            Pin::new("3", "VSSQ", "GND"),
            Pin::new("9", "VDD_CORE", "POWER"),
        ];
        let graph = graph_with(chip.clone(), Model::new("dq", ModelType::IO));
        let pins: Vec<String> = ["in", "oe", "out", "vddq", "vss"].iter().map(|s| s.to_string()).collect();

        let supplies = resolve_supplies(&graph, ModelId(0), &pins, &NearestRailResolver);
        assert_eq!(supplies.pullup, "vddq");
        assert_eq!(supplies.pulldown, "vss");

        // Pin mapping wins over proximity.
        chip.pin_mapping.push(PinMapping {
            pin: "2".into(),
            pullup_ref: Some("VDD_CORE".into()),
            ..Default::default()
        });
        let graph = graph_with(chip, Model::new("dq", ModelType::IO));
        let pins: Vec<String> = ["in", "vdd_core", "vdd", "gnd"].iter().map(|s| s.to_string()).collect();
        let supplies = resolve_supplies(&graph, ModelId(0), &pins, &NearestRailResolver);
        assert_eq!(supplies.pullup, "vdd_core");
        assert_eq!(supplies.pulldown, "gnd");
    }

    #[test]
    fn test_skips_ineligible() {
        let ctx = CorrelationContext::new(DeckTemplate::builtin(), "tline.rlgc");
        let dir = tempfile::tempdir().unwrap();

        let graph = IbisGraph::new(vec![Model::new("clk", ModelType::Input)], vec![]);
        let result = build_correlation(&graph, ModelId(0), &ctx, dir.path(), None);
        assert!(matches!(result.status, CorrelationStatus::Skipped { .. }));
        assert_eq!(result.status.code(), 0);

        let graph = IbisGraph::new(vec![Model::new("dq", ModelType::ThreeState)], vec![]);
        let result = build_correlation(&graph, ModelId(0), &ctx, dir.path(), None);
        assert_eq!(result.status, CorrelationStatus::Skipped { reason: "no netlist".into() });
        assert!(result.deck.is_none());
    }

    fn io_graph(dir: &Path) -> IbisGraph {
        let netlist = dir.join("dq.sp");
        std::fs::write(&netlist, "M1 pad in vdd vdd pfet\nM2 pad in vss vss nfet\nX1 oe in ctl\n").unwrap();

        let mut model = Model::new("DQ IO", ModelType::IO);
        model.spice_file = Some(netlist);
        model.enable = Enable::ActiveLow;

        let mut chip = Component::new("CHIP");
        chip.pins = vec![Pin::new("1", "DQ", "DQ IO"), Pin::new("2", "VDD", "POWER")];
        graph_with(chip, model)
    }

    #[test]
    fn test_render_builtin_deck() {
        let dir = tempfile::tempdir().unwrap();
        let graph = io_graph(dir.path());
        let ctx = CorrelationContext::new(DeckTemplate::builtin(), "tline.rlgc");

        let result = build_correlation(&graph, ModelId(0), &ctx, dir.path(), None);
        assert_eq!(result.status, CorrelationStatus::Rendered);

        let deck = result.deck.unwrap();
        assert_eq!(deck, dir.path().join("corr_dq_io.sp"));
        let text = std::fs::read_to_string(&deck).unwrap();

        assert!(text.contains("X1 in1 en1 out1"));
        assert!(text.contains("X3 in3 en3 out3"));
        assert!(text.contains("corr_dq_io_buf\n"));
        assert!(text.contains("RLGCfile='tline.rlgc'"));
        // Active-low enable: drivers held low, receiver high.
        assert!(text.contains("Ven1 en1 0 0\n"));
        assert!(text.contains("Ven3 en3 0 3.3\n"));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn test_template_error_reported() {
        let dir = tempfile::tempdir().unwrap();
        let graph = io_graph(dir.path());
        let ctx = CorrelationContext::new(DeckTemplate::from_text("{{nope}}"), "t");

        let result = build_correlation(&graph, ModelId(0), &ctx, dir.path(), None);
        assert_eq!(result.status.code(), -1);
        assert!(result.deck.is_none());
    }

    struct FixedRunner(Result<i32, u64>);

    impl SimulatorRunner for FixedRunner {
        fn run(&self, _deck: &Path, output_base: &Path) -> SpiceResult<RunOutput> {
            match self.0 {
                Ok(0) => Ok(RunOutput {
                    waveform: self.waveform_path(output_base),
                    log: self.log_path(output_base),
                    elapsed: Duration::from_millis(1),
                }),
                Ok(code) => Err(SpiceError::Simulation { code, log: self.log_path(output_base) }),
                Err(secs) => Err(SpiceError::Timeout { secs }),
            }
        }

        fn log_path(&self, output_base: &Path) -> PathBuf {
            output_base.with_extension("lis")
        }

        fn waveform_path(&self, output_base: &Path) -> PathBuf {
            output_base.with_extension("tr0")
        }
    }

    #[test]
    fn test_runner_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let graph = io_graph(dir.path());
        let ctx = CorrelationContext::new(DeckTemplate::builtin(), "tline.rlgc");

        let ok = build_correlation(&graph, ModelId(0), &ctx, dir.path(), Some(&FixedRunner(Ok(0))));
        assert_eq!(
            ok.status,
            CorrelationStatus::Completed { waveform: dir.path().join("corr_dq_io.tr0") }
        );

        let failed = build_correlation(&graph, ModelId(0), &ctx, dir.path(), Some(&FixedRunner(Ok(2))));
        assert_eq!(failed.status.code(), 2);
        assert!(failed.deck.is_some());
        assert!(matches!(
            &failed.status,
            CorrelationStatus::SimulatorFailed { log, .. } if log.ends_with("corr_dq_io.lis")
        ));

        let timeout = build_correlation(&graph, ModelId(0), &ctx, dir.path(), Some(&FixedRunner(Err(5))));
        assert!(timeout.status.is_failure());
        assert_eq!(timeout.status.code(), -1);
    }
}
