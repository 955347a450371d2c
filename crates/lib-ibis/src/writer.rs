//! Render a resolved graph as `.ibs` model-description text.
//!
//! Output follows IBIS keyword layout closely enough for the table extractor
//! and common viewers to read it back. Numbers go through
//! [`format_si`](lib_types::format_si); unset slots print as `NA`.

use crate::error::{ParseError, ParseResult};
use lib_types::{
    format_si, write_atomic, Component, GlobalDefaults, IbisGraph, Model, Pin, PinParasitics,
    Ramp, TypMinMax, WaveformTable,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// File header keywords.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IbisHeader {
    /// IBIS version.
    pub ibis_ver: String,

    /// File name.
    pub file_name: String,

    /// File revision.
    pub file_rev: String,

    pub date: String,

    /// Source (tool or vendor).
    pub source: String,

    pub notes: String,

    pub copyright: String,
}

impl Default for IbisHeader {
    fn default() -> Self {
        Self {
            ibis_ver: "5.1".to_string(),
            file_name: String::new(),
            file_rev: "1.0".to_string(),
            date: String::new(),
            source: concat!("ibis-forge ", env!("CARGO_PKG_VERSION")).to_string(),
            notes: String::new(),
            copyright: String::new(),
        }
    }
}

/// A graph plus header, rendered through [`fmt::Display`].
pub struct IbisDocument<'a> {
    graph: &'a IbisGraph,
    globals: &'a GlobalDefaults,
    header: &'a IbisHeader,
}

impl<'a> IbisDocument<'a> {
    pub fn new(graph: &'a IbisGraph, globals: &'a GlobalDefaults, header: &'a IbisHeader) -> Self {
        Self {
            graph,
            globals,
            header,
        }
    }

    fn write_header(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.header;
        for (keyword, value) in [
            ("IBIS Ver", &h.ibis_ver),
            ("File Name", &h.file_name),
            ("File Rev", &h.file_rev),
            ("Date", &h.date),
            ("Source", &h.source),
            ("Notes", &h.notes),
            ("Copyright", &h.copyright),
        ] {
            if !value.is_empty() {
                writeln!(f, "{:<20}{}", format!("[{}]", keyword), value)?;
            }
        }
        writeln!(f, "|")
    }

    fn package_of<'c>(&'c self, component: &'c Component) -> &'c PinParasitics {
        component.parasitics.as_ref().unwrap_or(&self.globals.parasitics)
    }

    fn write_component(&self, f: &mut fmt::Formatter<'_>, component: &Component) -> fmt::Result {
        writeln!(f, "{:<20}{}", "[Component]", component.name)?;
        if !component.manufacturer.is_empty() {
            writeln!(f, "{:<20}{}", "[Manufacturer]", component.manufacturer)?;
        }

        let package = self.package_of(component);
        writeln!(f, "[Package]")?;
        writeln!(f, "| {:<18}{:<13}{:<13}{:<13}", "variable", "typ", "min", "max")?;
        writeln!(f, "{:<20}{}", "R_pkg", package.r_pkg)?;
        writeln!(f, "{:<20}{}", "L_pkg", package.l_pkg)?;
        writeln!(f, "{:<20}{}", "C_pkg", package.c_pkg)?;
        writeln!(f, "|")?;

        // Per-pin columns appear only when some pin differs from the package.
        let per_pin = component.pins.iter().any(|pin| {
            pin.parasitics
                .as_ref()
                .is_some_and(|p| !p.same_as(package))
        });

        if per_pin {
            writeln!(
                f,
                "{:<20}{:<16}{:<16}{:<12}{:<12}{}",
                "[Pin]", "signal_name", "model_name", "R_pin", "L_pin", "C_pin"
            )?;
        } else {
            writeln!(f, "{:<20}{:<16}{}", "[Pin]", "signal_name", "model_name")?;
        }

        for pin in &component.pins {
            write_pin(f, pin, per_pin.then_some(package))?;
        }
        writeln!(f, "|")?;

        self.write_diff_pins(f, component)
    }

    fn write_diff_pins(&self, f: &mut fmt::Formatter<'_>, component: &Component) -> fmt::Result {
        let mut written: HashSet<(&str, &str)> = HashSet::new();
        let mut pairs = Vec::new();

        for pin in &component.pins {
            let Some(partner) = pin.diff_pin.as_deref().map(str::trim) else {
                continue;
            };
            if partner.is_empty() || written.contains(&(partner, pin.name.as_str())) {
                continue;
            }
            written.insert((pin.name.as_str(), partner));
            pairs.push((pin.name.as_str(), partner));
        }

        if pairs.is_empty() {
            return Ok(());
        }

        writeln!(
            f,
            "{:<20}{:<10}{:<8}{:<12}{:<12}{}",
            "[Diff Pin]", "inv_pin", "vdiff", "tdelay_typ", "tdelay_min", "tdelay_max"
        )?;
        for (pin, partner) in pairs {
            writeln!(f, "{:<20}{:<10}{:<8}{:<12}{:<12}{}", pin, partner, "NA", "NA", "NA", "NA")?;
        }
        writeln!(f, "|")
    }

    fn write_model(&self, f: &mut fmt::Formatter<'_>, model: &Model) -> fmt::Result {
        let e = &model.electrical;

        writeln!(f, "{:<20}{}", "[Model]", model.name)?;
        writeln!(f, "{:<20}{}", "Model_type", model.model_type)?;
        writeln!(f, "{:<20}{}", "Polarity", model.polarity.as_str())?;
        if model.model_type.is_bidirectional() {
            writeln!(f, "{:<20}{}", "Enable", model.enable.as_str())?;
        }
        if !e.vil.typ.is_nan() {
            writeln!(f, "Vinl = {}", format_si(e.vil.typ))?;
        }
        if !e.vih.typ.is_nan() {
            writeln!(f, "Vinh = {}", format_si(e.vih.typ))?;
        }
        if !e.c_comp.is_unset() {
            writeln!(f, "| {:<18}{:<13}{:<13}{:<13}", "", "typ", "min", "max")?;
            writeln!(f, "{:<20}{}", "C_comp", e.c_comp)?;
        }
        writeln!(f, "|")?;

        for (keyword, value) in [
            ("[Temperature Range]", &e.temp_range),
            ("[Voltage Range]", &e.voltage_range),
            ("[Pullup Reference]", &e.pullup_ref),
            ("[Pulldown Reference]", &e.pulldown_ref),
            ("[POWER Clamp Reference]", &e.power_clamp_ref),
            ("[GND Clamp Reference]", &e.gnd_clamp_ref),
        ] {
            write_tmm_keyword(f, keyword, value)?;
        }

        if let Some(ramp) = model.ramp.as_ref().filter(|r| r.has_data()) {
            write_ramp(f, ramp, e.r_load)?;
        }

        for table in &model.rising_waveforms {
            write_waveform(f, "[Rising Waveform]", table)?;
        }
        for table in &model.falling_waveforms {
            write_waveform(f, "[Falling Waveform]", table)?;
        }

        writeln!(f, "|")
    }
}

impl fmt::Display for IbisDocument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_header(f)?;
        for component in &self.graph.components {
            self.write_component(f, component)?;
        }
        for model in &self.graph.models {
            self.write_model(f, model)?;
        }
        writeln!(f, "[End]")
    }
}

fn write_pin(
    f: &mut fmt::Formatter<'_>,
    pin: &Pin,
    package: Option<&PinParasitics>,
) -> fmt::Result {
    let model_name = match pin.model_name.trim() {
        "" => "NC",
        name => name,
    };
    write!(f, "{:<20}{:<16}", pin.name, pin.signal_name)?;

    let Some(package) = package else {
        return writeln!(f, "{}", model_name);
    };
    let own = pin.parasitics.as_ref().unwrap_or(package);
    writeln!(
        f,
        "{:<16}{:<12}{:<12}{}",
        model_name,
        format_si(own.r_pkg.typ),
        format_si(own.l_pkg.typ),
        format_si(own.c_pkg.typ)
    )
}

fn write_tmm_keyword(f: &mut fmt::Formatter<'_>, keyword: &str, value: &TypMinMax) -> fmt::Result {
    if value.is_unset() {
        return Ok(());
    }
    writeln!(f, "{:<24}{}", keyword, value)
}

fn slew(dv: f64, dt: f64) -> String {
    if dv.is_nan() || dt.is_nan() {
        "NA".to_string()
    } else {
        format!("{}/{}", format_si(dv), format_si(dt))
    }
}

fn write_ramp(f: &mut fmt::Formatter<'_>, ramp: &Ramp, r_load: f64) -> fmt::Result {
    writeln!(f, "[Ramp]")?;
    writeln!(f, "| {:<18}{:<16}{:<16}{:<16}", "variable", "typ", "min", "max")?;
    for (label, dv, dt) in [("dV/dt_r", &ramp.dv_r, &ramp.dt_r), ("dV/dt_f", &ramp.dv_f, &ramp.dt_f)] {
        writeln!(
            f,
            "{:<20}{:<16}{:<16}{:<16}",
            label,
            slew(dv.typ, dt.typ),
            slew(dv.min, dt.min),
            slew(dv.max, dt.max)
        )?;
    }
    if !r_load.is_nan() && r_load != 0.0 {
        writeln!(f, "R_load = {}", format_si(r_load))?;
    }
    Ok(())
}

fn write_waveform(f: &mut fmt::Formatter<'_>, keyword: &str, table: &WaveformTable) -> fmt::Result {
    writeln!(f, "{}", keyword)?;
    writeln!(f, "R_fixture = {}", format_si(table.r_fixture))?;
    writeln!(f, "V_fixture = {}", format_si(table.v_fixture))?;
    for (name, value) in [
        ("V_fixture_min", table.v_fixture_min),
        ("V_fixture_max", table.v_fixture_max),
        ("C_fixture", table.c_fixture),
        ("L_fixture", table.l_fixture),
    ] {
        if let Some(v) = value {
            writeln!(f, "{} = {}", name, format_si(v))?;
        }
    }
    writeln!(f, "| {:<14}{:<14}{:<14}{:<14}", "time", "V(typ)", "V(min)", "V(max)")?;
    for &(t, typ, min, max) in &table.points {
        writeln!(
            f,
            "{:<16}{:<14}{:<14}{}",
            format_si(t),
            format_si(typ),
            format_si(min),
            format_si(max)
        )?;
    }
    Ok(())
}

/// Render the graph as model-description text.
pub fn write_ibis(graph: &IbisGraph, globals: &GlobalDefaults, header: &IbisHeader) -> String {
    IbisDocument::new(graph, globals, header).to_string()
}

/// Render the graph and write it atomically to `path`.
///
/// An empty `header.file_name` is replaced by the file name of `path`.
pub fn write_ibis_file(
    path: &Path,
    graph: &IbisGraph,
    globals: &GlobalDefaults,
    header: &IbisHeader,
) -> ParseResult<()> {
    let mut header = header.clone();
    if header.file_name.is_empty() {
        if let Some(name) = path.file_name() {
            header.file_name = name.to_string_lossy().into_owned();
        }
    }

    let text = write_ibis(graph, globals, &header);
    write_atomic(path, text.as_bytes()).map_err(|e| ParseError::io(path, e))?;

    tracing::info!(
        "Wrote {} models / {} components to {:?}",
        graph.models.len(),
        graph.components.len(),
        path
    );
    Ok(())
}
