//! The buffer-model graph.
//!
//! A run works on one [`IbisGraph`]: the models it owns and the components
//! whose pins refer to those models by name. Pins never own a model; after
//! linking they hold a [`PinLink`] naming the model by index, or one of the
//! explicit "no model" cases for supply and unconnected pins.

use crate::tmm::{fill_scalar, scalar, unset_scalar, TypMinMax};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Model type enumeration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelType {
    #[default]
    Input,
    Output,
    IO,
    ThreeState,
    OpenDrain,
    OpenSink,
    OpenSource,
    IOOpenDrain,
    IOOpenSink,
    IOOpenSource,
    InputECL,
    OutputECL,
    IOECL,
    ThreeStateECL,
    Terminator,
    Series,
    SeriesSwitch,
}

impl ModelType {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "input" => Some(Self::Input),
            "output" => Some(Self::Output),
            "i/o" | "io" => Some(Self::IO),
            "3-state" | "three-state" => Some(Self::ThreeState),
            "open_drain" => Some(Self::OpenDrain),
            "open_sink" => Some(Self::OpenSink),
            "open_source" => Some(Self::OpenSource),
            "i/o_open_drain" | "io_open_drain" => Some(Self::IOOpenDrain),
            "i/o_open_sink" | "io_open_sink" => Some(Self::IOOpenSink),
            "i/o_open_source" | "io_open_source" => Some(Self::IOOpenSource),
            "input_ecl" => Some(Self::InputECL),
            "output_ecl" => Some(Self::OutputECL),
            "i/o_ecl" | "io_ecl" => Some(Self::IOECL),
            "3-state_ecl" => Some(Self::ThreeStateECL),
            "terminator" => Some(Self::Terminator),
            "series" => Some(Self::Series),
            "series_switch" => Some(Self::SeriesSwitch),
            _ => None,
        }
    }

    /// Keyword spelling used in model-description files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Output => "Output",
            Self::IO => "I/O",
            Self::ThreeState => "3-state",
            Self::OpenDrain => "Open_drain",
            Self::OpenSink => "Open_sink",
            Self::OpenSource => "Open_source",
            Self::IOOpenDrain => "I/O_open_drain",
            Self::IOOpenSink => "I/O_open_sink",
            Self::IOOpenSource => "I/O_open_source",
            Self::InputECL => "Input_ECL",
            Self::OutputECL => "Output_ECL",
            Self::IOECL => "I/O_ECL",
            Self::ThreeStateECL => "3-state_ECL",
            Self::Terminator => "Terminator",
            Self::Series => "Series",
            Self::SeriesSwitch => "Series_switch",
        }
    }

    /// Buffers with an output enable (I/O and 3-state, any technology).
    pub fn is_bidirectional(&self) -> bool {
        matches!(
            self,
            Self::IO
                | Self::ThreeState
                | Self::IOOpenDrain
                | Self::IOOpenSink
                | Self::IOOpenSource
                | Self::IOECL
                | Self::ThreeStateECL
        )
    }
}

impl TryFrom<String> for ModelType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value).ok_or_else(|| format!("unknown model type '{}'", value))
    }
}

impl From<ModelType> for String {
    fn from(value: ModelType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output polarity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    #[default]
    #[serde(rename = "Non-Inverting", alias = "non_inverting", alias = "non-inverting")]
    NonInverting,
    #[serde(rename = "Inverting", alias = "inverting")]
    Inverting,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonInverting => "Non-Inverting",
            Self::Inverting => "Inverting",
        }
    }
}

/// Output-enable polarity for 3-state and I/O buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Enable {
    #[default]
    #[serde(rename = "Active-High", alias = "active_high", alias = "active-high")]
    ActiveHigh,
    #[serde(rename = "Active-Low", alias = "active_low", alias = "active-low")]
    ActiveLow,
}

impl Enable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveHigh => "Active-High",
            Self::ActiveLow => "Active-Low",
        }
    }
}

/// The electrical fields shared by global defaults, models and component
/// overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Electrical {
    pub voltage_range: TypMinMax,
    pub temp_range: TypMinMax,
    pub pullup_ref: TypMinMax,
    pub pulldown_ref: TypMinMax,
    pub power_clamp_ref: TypMinMax,
    pub gnd_clamp_ref: TypMinMax,

    /// Input threshold low.
    pub vil: TypMinMax,

    /// Input threshold high.
    pub vih: TypMinMax,

    /// Stimulus rise time.
    pub tr: TypMinMax,

    /// Stimulus fall time.
    pub tf: TypMinMax,

    /// Die capacitance.
    pub c_comp: TypMinMax,

    /// Load resistance for ramp and waveform extraction.
    #[serde(default = "unset_scalar", with = "scalar")]
    pub r_load: f64,

    /// Transient simulation stop time in seconds.
    #[serde(default = "unset_scalar", with = "scalar")]
    pub sim_time: f64,

    #[serde(default = "unset_scalar", with = "scalar")]
    pub derate_vi_pct: f64,

    #[serde(default = "unset_scalar", with = "scalar")]
    pub derate_ramp_pct: f64,
}

impl Default for Electrical {
    fn default() -> Self {
        Self {
            voltage_range: TypMinMax::UNSET,
            temp_range: TypMinMax::UNSET,
            pullup_ref: TypMinMax::UNSET,
            pulldown_ref: TypMinMax::UNSET,
            power_clamp_ref: TypMinMax::UNSET,
            gnd_clamp_ref: TypMinMax::UNSET,
            vil: TypMinMax::UNSET,
            vih: TypMinMax::UNSET,
            tr: TypMinMax::UNSET,
            tf: TypMinMax::UNSET,
            c_comp: TypMinMax::UNSET,
            r_load: f64::NAN,
            sim_time: f64::NAN,
            derate_vi_pct: f64::NAN,
            derate_ramp_pct: f64::NAN,
        }
    }
}

impl Electrical {
    fn triples(&self) -> [&TypMinMax; 11] {
        [
            &self.voltage_range,
            &self.temp_range,
            &self.pullup_ref,
            &self.pulldown_ref,
            &self.power_clamp_ref,
            &self.gnd_clamp_ref,
            &self.vil,
            &self.vih,
            &self.tr,
            &self.tf,
            &self.c_comp,
        ]
    }

    fn triples_mut(&mut self) -> [&mut TypMinMax; 11] {
        [
            &mut self.voltage_range,
            &mut self.temp_range,
            &mut self.pullup_ref,
            &mut self.pulldown_ref,
            &mut self.power_clamp_ref,
            &mut self.gnd_clamp_ref,
            &mut self.vil,
            &mut self.vih,
            &mut self.tr,
            &mut self.tf,
            &mut self.c_comp,
        ]
    }

    /// Copy every unset slot and unset scalar from `source`.
    ///
    /// Returns how many slots/scalars were filled.
    pub fn inherit_from(&mut self, source: &Electrical) -> usize {
        let mut filled = 0;
        for (target, from) in self.triples_mut().into_iter().zip(source.triples()) {
            filled += target.fill_from(from);
        }
        for (target, from) in [
            (&mut self.r_load, source.r_load),
            (&mut self.sim_time, source.sim_time),
            (&mut self.derate_vi_pct, source.derate_vi_pct),
            (&mut self.derate_ramp_pct, source.derate_ramp_pct),
        ] {
            filled += usize::from(fill_scalar(target, from));
        }
        filled
    }

    /// Field-by-field equality with unset slots comparing equal.
    pub fn same_as(&self, other: &Electrical) -> bool {
        let scalar_eq = |a: f64, b: f64| (a.is_nan() && b.is_nan()) || a == b;
        self.triples()
            .iter()
            .zip(other.triples())
            .all(|(a, b)| a.same_as(b))
            && scalar_eq(self.r_load, other.r_load)
            && scalar_eq(self.sim_time, other.sim_time)
            && scalar_eq(self.derate_vi_pct, other.derate_vi_pct)
            && scalar_eq(self.derate_ramp_pct, other.derate_ramp_pct)
    }
}

/// [Ramp] data: rising and falling dV/dt per corner.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Ramp {
    pub dv_r: TypMinMax,
    pub dt_r: TypMinMax,
    pub dv_f: TypMinMax,
    pub dt_f: TypMinMax,

    /// Derating percentage applied to the ramp.
    #[serde(default = "unset_scalar", with = "scalar")]
    pub derate_pct: f64,
}

impl Default for Ramp {
    fn default() -> Self {
        Self {
            dv_r: TypMinMax::UNSET,
            dt_r: TypMinMax::UNSET,
            dv_f: TypMinMax::UNSET,
            dt_f: TypMinMax::UNSET,
            derate_pct: f64::NAN,
        }
    }
}

impl Ramp {
    pub fn has_data(&self) -> bool {
        !(self.dv_r.is_unset() && self.dv_f.is_unset())
    }
}

/// Waveform table (V-T data) with its test fixture.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WaveformTable {
    /// R_fixture value.
    pub r_fixture: f64,

    /// V_fixture value.
    pub v_fixture: f64,

    #[serde(default)]
    pub v_fixture_min: Option<f64>,

    #[serde(default)]
    pub v_fixture_max: Option<f64>,

    #[serde(default)]
    pub c_fixture: Option<f64>,

    #[serde(default)]
    pub l_fixture: Option<f64>,

    /// (Time, V_typical, V_min, V_max) points.
    #[serde(default)]
    pub points: Vec<(f64, f64, f64, f64)>,
}

/// I/O buffer model.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Model {
    /// Model name.
    pub name: String,

    /// Model type.
    #[serde(default)]
    pub model_type: ModelType,

    #[serde(default)]
    pub polarity: Polarity,

    #[serde(default)]
    pub enable: Enable,

    #[serde(default)]
    pub electrical: Electrical,

    /// Created during completion if the model does not declare one.
    #[serde(default)]
    pub ramp: Option<Ramp>,

    /// Transistor-level netlist this model was extracted from.
    #[serde(default)]
    pub spice_file: Option<PathBuf>,

    #[serde(default)]
    pub rising_waveforms: Vec<WaveformTable>,

    #[serde(default)]
    pub falling_waveforms: Vec<WaveformTable>,
}

impl Model {
    pub fn new(name: impl Into<String>, model_type: ModelType) -> Self {
        Self {
            name: name.into(),
            model_type,
            ..Default::default()
        }
    }
}

/// Package parasitics for a component or a single pin.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PinParasitics {
    pub r_pkg: TypMinMax,
    pub l_pkg: TypMinMax,
    pub c_pkg: TypMinMax,
}

impl PinParasitics {
    pub fn new(r_pkg: TypMinMax, l_pkg: TypMinMax, c_pkg: TypMinMax) -> Self {
        Self { r_pkg, l_pkg, c_pkg }
    }

    /// Fill unset slots field-by-field from `source`.
    pub fn fill_from(&mut self, source: &PinParasitics) -> usize {
        self.r_pkg.fill_from(&source.r_pkg)
            + self.l_pkg.fill_from(&source.l_pkg)
            + self.c_pkg.fill_from(&source.c_pkg)
    }

    pub fn same_as(&self, other: &PinParasitics) -> bool {
        self.r_pkg.same_as(&other.r_pkg)
            && self.l_pkg.same_as(&other.l_pkg)
            && self.c_pkg.same_as(&other.c_pkg)
    }
}

/// Index of a model within its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub usize);

/// What a pin's model-name field resolved to.
///
/// Supply and unconnected pins are their own cases so "intentionally no
/// model" never looks like a failed lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PinLink {
    Linked(ModelId),
    PowerRail,
    Ground,
    NoConnect,
    #[default]
    Unresolved,
}

impl PinLink {
    /// Classify a reserved model name (`POWER`, `GND`, `NC`, `#`).
    ///
    /// An empty name is treated as no-connect.
    pub fn reserved(model_name: &str) -> Option<PinLink> {
        let name = model_name.trim();
        if name.is_empty() || name == "#" || name.eq_ignore_ascii_case("NC") {
            Some(PinLink::NoConnect)
        } else if name.eq_ignore_ascii_case("POWER") {
            Some(PinLink::PowerRail)
        } else if name.eq_ignore_ascii_case("GND") {
            Some(PinLink::Ground)
        } else {
            None
        }
    }
}

/// Which companion-pin reference a pin declares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompanionKind {
    Input,
    Enable,
    Differential,
}

impl fmt::Display for CompanionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input pin",
            Self::Enable => "enable pin",
            Self::Differential => "differential pin",
        })
    }
}

/// Pin definition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Pin {
    /// Pin name/number.
    pub name: String,

    /// Signal name.
    pub signal_name: String,

    /// Associated model name, or POWER / GND / NC.
    pub model_name: String,

    /// Input pin paired with an output.
    #[serde(default)]
    pub input_pin: Option<String>,

    #[serde(default)]
    pub enable_pin: Option<String>,

    /// Differential partner.
    #[serde(default)]
    pub diff_pin: Option<String>,

    #[serde(default)]
    pub parasitics: Option<PinParasitics>,

    #[serde(skip)]
    pub link: PinLink,
}

impl Pin {
    pub fn new(
        name: impl Into<String>,
        signal_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            signal_name: signal_name.into(),
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn linked_model(&self) -> Option<ModelId> {
        match self.link {
            PinLink::Linked(id) => Some(id),
            _ => None,
        }
    }

    /// Declared, non-blank companion references, in a fixed order.
    pub fn companions(&self) -> impl Iterator<Item = (CompanionKind, &str)> {
        [
            (CompanionKind::Input, self.input_pin.as_deref()),
            (CompanionKind::Enable, self.enable_pin.as_deref()),
            (CompanionKind::Differential, self.diff_pin.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, name)| {
            name.map(str::trim)
                .filter(|n| !n.is_empty())
                .map(|n| (kind, n))
        })
    }
}

/// One row of a component's pin mapping: which supply buses feed a pin.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PinMapping {
    pub pin: String,
    #[serde(default)]
    pub pulldown_ref: Option<String>,
    #[serde(default)]
    pub pullup_ref: Option<String>,
    #[serde(default)]
    pub gnd_clamp_ref: Option<String>,
    #[serde(default)]
    pub power_clamp_ref: Option<String>,
}

/// Component definition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Component {
    /// Component name.
    pub name: String,

    /// Manufacturer.
    #[serde(default)]
    pub manufacturer: String,

    /// Pin definitions, in declaration order.
    #[serde(default)]
    pub pins: Vec<Pin>,

    /// Component-level overrides of global defaults.
    #[serde(default)]
    pub overrides: Electrical,

    /// Package parasitics.
    #[serde(default)]
    pub parasitics: Option<PinParasitics>,

    /// Netlist shared by the models this component uses.
    #[serde(default)]
    pub spice_file: Option<PathBuf>,

    #[serde(default)]
    pub pin_mapping: Vec<PinMapping>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn find_pin(&self, name: &str) -> Option<&Pin> {
        self.pins.iter().find(|p| p.name == name)
    }

    pub fn mapping_for(&self, pin: &str) -> Option<&PinMapping> {
        self.pin_mapping.iter().find(|m| m.pin == pin)
    }
}

/// Process-wide defaults, read once per run and passed explicitly.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalDefaults {
    pub electrical: Electrical,
    pub parasitics: PinParasitics,
}

/// Case-insensitive exact-name lookup over a model list; first match wins.
pub fn find_model_in(models: &[Model], name: &str) -> Option<ModelId> {
    let name = name.trim();
    models
        .iter()
        .position(|m| m.name.eq_ignore_ascii_case(name))
        .map(ModelId)
}

/// Models and the components that reference them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IbisGraph {
    #[serde(default)]
    pub models: Vec<Model>,

    #[serde(default)]
    pub components: Vec<Component>,
}

impl IbisGraph {
    pub fn new(models: Vec<Model>, components: Vec<Component>) -> Self {
        Self { models, components }
    }

    /// Case-insensitive exact-name lookup; first match wins.
    pub fn find_model(&self, name: &str) -> Option<ModelId> {
        find_model_in(&self.models, name)
    }

    pub fn model(&self, id: ModelId) -> &Model {
        &self.models[id.0]
    }

    pub fn model_mut(&mut self, id: ModelId) -> &mut Model {
        &mut self.models[id.0]
    }

    /// Every (component, pin) pair linked to `id`.
    pub fn pins_linked_to(&self, id: ModelId) -> impl Iterator<Item = (&Component, &Pin)> {
        self.components.iter().flat_map(move |component| {
            component
                .pins
                .iter()
                .filter(move |pin| pin.link == PinLink::Linked(id))
                .map(move |pin| (component, pin))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_round_trip_names() {
        assert_eq!(ModelType::from_str("I/O"), Some(ModelType::IO));
        assert_eq!(ModelType::from_str("3-state"), Some(ModelType::ThreeState));
        assert_eq!(ModelType::from_str("bogus"), None);
        assert!(ModelType::IO.is_bidirectional());
        assert!(ModelType::ThreeStateECL.is_bidirectional());
        assert!(!ModelType::Output.is_bidirectional());
        assert_eq!(ModelType::from_str(ModelType::IOOpenDrain.as_str()), Some(ModelType::IOOpenDrain));
    }

    #[test]
    fn test_reserved_pin_names() {
        assert_eq!(PinLink::reserved("POWER"), Some(PinLink::PowerRail));
        assert_eq!(PinLink::reserved(" gnd "), Some(PinLink::Ground));
        assert_eq!(PinLink::reserved("NC"), Some(PinLink::NoConnect));
        assert_eq!(PinLink::reserved("#"), Some(PinLink::NoConnect));
        assert_eq!(PinLink::reserved(""), Some(PinLink::NoConnect));
        assert_eq!(PinLink::reserved("DQ_MODEL"), None);
    }

    #[test]
    fn test_find_model_case_insensitive() {
        let graph = IbisGraph::new(
            vec![Model::new("dq_io", ModelType::IO), Model::new("CLK_IN", ModelType::Input)],
            vec![],
        );
        assert_eq!(graph.find_model("DQ_IO"), Some(ModelId(0)));
        assert_eq!(graph.find_model("clk_in"), Some(ModelId(1)));
        assert_eq!(graph.find_model("clk"), None);
    }

    #[test]
    fn test_electrical_inherit() {
        let mut model = Electrical {
            voltage_range: TypMinMax::new(3.3, 3.0, 3.6),
            r_load: 0.0,
            ..Default::default()
        };
        let global = Electrical {
            voltage_range: TypMinMax::new(5.0, 4.5, 5.5),
            temp_range: TypMinMax::new(27.0, 100.0, 0.0),
            r_load: 50.0,
            ..Default::default()
        };

        assert_eq!(model.inherit_from(&global), 4);
        assert_eq!(model.voltage_range.slots(), [3.3, 3.0, 3.6]);
        assert_eq!(model.temp_range.slots(), [27.0, 100.0, 0.0]);
        assert_eq!(model.r_load, 50.0);
        assert_eq!(model.inherit_from(&global), 0);
    }

    #[test]
    fn test_companions_iter() {
        let mut pin = Pin::new("A1", "DQ0", "dq_io");
        pin.enable_pin = Some("A2".into());
        pin.diff_pin = Some("A3".into());
        let kinds: Vec<_> = pin.companions().collect();
        assert_eq!(
            kinds,
            vec![(CompanionKind::Enable, "A2"), (CompanionKind::Differential, "A3")]
        );
    }

    #[test]
    fn test_deserialize_component_toml() {
        let text = r#"
            name = "CHIP"
            manufacturer = "ACME"
            spice_file = "chip.sp"

            [overrides]
            voltage_range = [1.8, 1.7, 1.9]
            sim_time = "20n"

            [[pins]]
            name = "1"
            signal_name = "DQ0"
            model_name = "dq_io"
            enable_pin = "2"

            [[pins]]
            name = "2"
            signal_name = "OE"
            model_name = "oe_in"
        "#;
        let component: Component = toml::from_str(text).unwrap();
        assert_eq!(component.pins.len(), 2);
        assert_eq!(component.pins[0].link, PinLink::Unresolved);
        assert_eq!(component.overrides.voltage_range.typ, 1.8);
        assert!((component.overrides.sim_time - 20e-9).abs() < 1e-20);
        assert!(component.overrides.r_load.is_nan());
        assert!(component.parasitics.is_none());
    }
}
