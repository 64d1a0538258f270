use crate::domain::{CheckReport, SpexError, SpexResult};
use crate::table::{Column, HeaderValue, Table, TabularStore};
use std::ops::Range;

/// Mask selecting one (sector, region) pair inside a [`ResponseMatrix`]:
/// contiguous row ranges in the component, group, and value tables, derived
/// from cumulative sums of the count columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRegionMask {
    pub components: Range<usize>,
    pub groups: Range<usize>,
    pub values: Range<usize>,
}

/// A SPEX response file in memory: three parallel tables.
///
/// * Component rows describe one (sector, region) pair each.
/// * Group rows describe one non-empty model energy bin each; the groups of
///   one component are contiguous.
/// * Value rows hold one response element per (group, channel) pair, in
///   group order.
///
/// Ranges into the group and value tables are never stored; they are
/// recomputed from the `component_groups` and `group_channels` count columns
/// so that masking and concatenation stay O(n) array operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMatrix {
    /// Channels per component (SPEX_RESP_ICOMP / NCHAN).
    pub component_channels: Vec<usize>,
    /// Energy groups per component (NEG).
    pub component_groups: Vec<usize>,
    /// Sector id per component.
    pub sector: Vec<usize>,
    /// Region id per component.
    pub region: Vec<usize>,
    /// Shared-component id per component; meaningful only when
    /// `shared_components` is set.
    pub shared_component: Vec<usize>,

    /// Group lower energy bound (keV).
    pub group_energy_low: Vec<f64>,
    /// Group upper energy bound (keV).
    pub group_energy_high: Vec<f64>,
    /// First covered channel per group (1-based).
    pub group_first_channel: Vec<usize>,
    /// Last covered channel per group (1-based, inclusive).
    pub group_last_channel: Vec<usize>,
    /// Channels per group.
    pub group_channels: Vec<usize>,
    /// Relative area factor per group; meaningful only when `area_scaling`
    /// is set.
    pub group_relative_area: Vec<f64>,

    /// Response values (m^2), one per (group, channel) pair.
    pub response: Vec<f64>,
    /// Response derivatives; meaningful only when `response_derivatives` is
    /// set.
    pub response_derivative: Vec<f64>,

    pub shared_components: bool,
    pub area_scaling: bool,
    pub response_derivatives: bool,

    pub sector_count: usize,
    pub region_count: usize,

    /// Channel order was flipped from wavelength to energy order.
    pub swapped: bool,
}

impl ResponseMatrix {
    pub fn component_count(&self) -> usize {
        self.component_channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.component_channels.is_empty()
    }

    fn capability_flags(&self) -> (bool, bool, bool) {
        (
            self.shared_components,
            self.area_scaling,
            self.response_derivatives,
        )
    }

    fn check_flags_compatible(&self, other: &ResponseMatrix) -> SpexResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        if self.shared_components != other.shared_components {
            return Err(SpexError::IncompatibleMatrix {
                detail: "shared-component settings differ".to_string(),
            });
        }
        if self.area_scaling != other.area_scaling {
            return Err(SpexError::IncompatibleMatrix {
                detail: "area-scaling settings differ".to_string(),
            });
        }
        if self.response_derivatives != other.response_derivatives {
            return Err(SpexError::IncompatibleMatrix {
                detail: "response-derivative settings differ".to_string(),
            });
        }
        Ok(())
    }

    fn adopt_flags(&mut self, other: &ResponseMatrix) {
        if self.is_empty() {
            let (shared, area, derivative) = other.capability_flags();
            self.shared_components = shared;
            self.area_scaling = area;
            self.response_derivatives = derivative;
        }
    }

    /// Locate all components of `(sector, region)` and derive the group and
    /// value slices from the cumulative count columns.
    pub fn get_region_mask(&self, sector: usize, region: usize) -> SpexResult<ResponseRegionMask> {
        let mut first_component = None;
        let mut last_component = 0;
        for (index, (component_sector, component_region)) in
            self.sector.iter().zip(self.region.iter()).enumerate()
        {
            if *component_sector == sector && *component_region == region {
                if first_component.is_none() {
                    first_component = Some(index);
                }
                last_component = index;
            }
        }
        let Some(first_component) = first_component else {
            return Err(SpexError::RegionNotFound { sector, region });
        };
        let components = first_component..last_component + 1;

        let group_start: usize = self.component_groups[..components.start].iter().sum();
        let group_len: usize = self.component_groups[components.clone()].iter().sum();
        let groups = group_start..group_start + group_len;

        let value_start: usize = self.group_channels[..groups.start].iter().sum();
        let value_len: usize = self.group_channels[groups.clone()].iter().sum();
        let values = value_start..value_start + value_len;

        Ok(ResponseRegionMask {
            components,
            groups,
            values,
        })
    }

    /// Copy out one (sector, region) pair as a fresh matrix renumbered to
    /// sector 1, region 1. A failing consistency check on the result is
    /// fatal to the call.
    pub fn extract_region(&self, sector: usize, region: usize) -> SpexResult<ResponseMatrix> {
        let mask = self.get_region_mask(sector, region)?;
        let component_count = mask.components.len();
        let extracted = ResponseMatrix {
            component_channels: self.component_channels[mask.components.clone()].to_vec(),
            component_groups: self.component_groups[mask.components.clone()].to_vec(),
            sector: vec![1; component_count],
            region: vec![1; component_count],
            shared_component: if self.shared_components {
                self.shared_component[mask.components.clone()].to_vec()
            } else {
                Vec::new()
            },
            group_energy_low: self.group_energy_low[mask.groups.clone()].to_vec(),
            group_energy_high: self.group_energy_high[mask.groups.clone()].to_vec(),
            group_first_channel: self.group_first_channel[mask.groups.clone()].to_vec(),
            group_last_channel: self.group_last_channel[mask.groups.clone()].to_vec(),
            group_channels: self.group_channels[mask.groups.clone()].to_vec(),
            group_relative_area: if self.area_scaling {
                self.group_relative_area[mask.groups.clone()].to_vec()
            } else {
                Vec::new()
            },
            response: self.response[mask.values.clone()].to_vec(),
            response_derivative: if self.response_derivatives {
                self.response_derivative[mask.values.clone()].to_vec()
            } else {
                Vec::new()
            },
            shared_components: self.shared_components,
            area_scaling: self.area_scaling,
            response_derivatives: self.response_derivatives,
            sector_count: 1,
            region_count: 1,
            swapped: self.swapped,
        };
        extracted.check().into_result("extracted response region")?;
        Ok(extracted)
    }

    /// Append all components of `other` under the key `(sector, region)`.
    /// Used to add grating orders as extra components of one region.
    pub fn append_component(
        &mut self,
        other: &ResponseMatrix,
        sector: usize,
        region: usize,
    ) -> SpexResult<()> {
        self.check_flags_compatible(other)?;
        self.adopt_flags(other);

        self.component_channels.extend_from_slice(&other.component_channels);
        self.component_groups.extend_from_slice(&other.component_groups);
        for _ in 0..other.component_count() {
            self.sector.push(sector);
            self.region.push(region);
        }
        if self.shared_components {
            self.shared_component.extend_from_slice(&other.shared_component);
        }

        self.group_energy_low.extend_from_slice(&other.group_energy_low);
        self.group_energy_high.extend_from_slice(&other.group_energy_high);
        self.group_first_channel.extend_from_slice(&other.group_first_channel);
        self.group_last_channel.extend_from_slice(&other.group_last_channel);
        self.group_channels.extend_from_slice(&other.group_channels);
        if self.area_scaling {
            self.group_relative_area.extend_from_slice(&other.group_relative_area);
        }

        self.response.extend_from_slice(&other.response);
        if self.response_derivatives {
            self.response_derivative.extend_from_slice(&other.response_derivative);
        }

        self.sector_count = self.sector_count.max(sector);
        self.region_count = self.region_count.max(region);
        Ok(())
    }

    /// Append region `(sector, region)` of `other` as a new region of this
    /// matrix, keeping the component rows as they are. This is the
    /// multi-region assembly step used when writing a whole dataset.
    pub fn concatenate_region(
        &mut self,
        other: &ResponseMatrix,
        sector: usize,
        region: usize,
    ) -> SpexResult<()> {
        let mask = other.get_region_mask(sector, region)?;
        self.check_flags_compatible(other)?;
        self.adopt_flags(other);

        self.component_channels
            .extend_from_slice(&other.component_channels[mask.components.clone()]);
        self.component_groups
            .extend_from_slice(&other.component_groups[mask.components.clone()]);
        self.sector.extend_from_slice(&other.sector[mask.components.clone()]);
        self.region.extend_from_slice(&other.region[mask.components.clone()]);
        if self.shared_components {
            self.shared_component
                .extend_from_slice(&other.shared_component[mask.components.clone()]);
        }

        self.group_energy_low
            .extend_from_slice(&other.group_energy_low[mask.groups.clone()]);
        self.group_energy_high
            .extend_from_slice(&other.group_energy_high[mask.groups.clone()]);
        self.group_first_channel
            .extend_from_slice(&other.group_first_channel[mask.groups.clone()]);
        self.group_last_channel
            .extend_from_slice(&other.group_last_channel[mask.groups.clone()]);
        self.group_channels
            .extend_from_slice(&other.group_channels[mask.groups.clone()]);
        if self.area_scaling {
            self.group_relative_area
                .extend_from_slice(&other.group_relative_area[mask.groups.clone()]);
        }

        self.response.extend_from_slice(&other.response[mask.values.clone()]);
        if self.response_derivatives {
            self.response_derivative
                .extend_from_slice(&other.response_derivative[mask.values]);
        }

        self.region_count += 1;
        self.sector_count = self.sector.iter().copied().max().unwrap_or(0);
        Ok(())
    }

    /// Remove region `(sector, region)`, renumbering trailing region ids
    /// down by one.
    pub fn delete_region(&mut self, sector: usize, region: usize) -> SpexResult<()> {
        let mask = self.get_region_mask(sector, region)?;

        drain_range(&mut self.response, mask.values.clone());
        if self.response_derivatives {
            drain_range(&mut self.response_derivative, mask.values.clone());
        }

        drain_range(&mut self.group_energy_low, mask.groups.clone());
        drain_range(&mut self.group_energy_high, mask.groups.clone());
        drain_range(&mut self.group_first_channel, mask.groups.clone());
        drain_range(&mut self.group_last_channel, mask.groups.clone());
        drain_range(&mut self.group_channels, mask.groups.clone());
        if self.area_scaling {
            drain_range(&mut self.group_relative_area, mask.groups.clone());
        }

        drain_range(&mut self.component_channels, mask.components.clone());
        drain_range(&mut self.component_groups, mask.components.clone());
        drain_range(&mut self.sector, mask.components.clone());
        drain_range(&mut self.region, mask.components.clone());
        if self.shared_components {
            drain_range(&mut self.shared_component, mask.components.clone());
        }

        for component_region in &mut self.region {
            if *component_region > region {
                *component_region -= 1;
            }
        }
        self.region_count -= 1;
        Ok(())
    }

    /// Flip every component between wavelength and energy channel order:
    /// each group's `(first, last)` becomes `(N−last+1, N−first+1)` for the
    /// component channel count N, and the group's value slice is reversed.
    pub fn swap_channel_order(&mut self) {
        let mut group = 0;
        let mut value = 0;
        for (component, groups) in self.component_groups.iter().copied().enumerate() {
            let channels = self.component_channels[component];
            for _ in 0..groups {
                let first = self.group_first_channel[group];
                let last = self.group_last_channel[group];
                self.group_first_channel[group] = channels - last + 1;
                self.group_last_channel[group] = channels - first + 1;

                let width = self.group_channels[group];
                self.response[value..value + width].reverse();
                if self.response_derivatives {
                    self.response_derivative[value..value + width].reverse();
                }
                value += width;
                group += 1;
            }
        }
        self.swapped = !self.swapped;
    }

    /// Shift every group's channel range by `delta`. The shift is validated
    /// against all groups before any of them is modified, so a failing call
    /// leaves the matrix untouched.
    pub fn shift_channels(&mut self, delta: i64) -> SpexResult<()> {
        let mut shifted_first = Vec::with_capacity(self.group_first_channel.len());
        let mut shifted_last = Vec::with_capacity(self.group_last_channel.len());

        let mut group = 0;
        for (component, groups) in self.component_groups.iter().copied().enumerate() {
            let channels = self.component_channels[component];
            for _ in 0..groups {
                let first = self.group_first_channel[group] as i64 + delta;
                let last = self.group_last_channel[group] as i64 + delta;
                if first < 1 || last > channels as i64 {
                    return Err(SpexError::ChannelOutOfRange {
                        shift: delta,
                        group,
                        channel_count: channels,
                    });
                }
                shifted_first.push(first as usize);
                shifted_last.push(last as usize);
                group += 1;
            }
        }

        self.group_first_channel = shifted_first;
        self.group_last_channel = shifted_last;
        Ok(())
    }

    pub fn check(&self) -> CheckReport {
        let mut report = CheckReport::new();

        let declared_groups: usize = self.component_groups.iter().sum();
        if declared_groups != self.group_channels.len() {
            report.add(format!(
                "component table declares {declared_groups} groups, group table holds {}",
                self.group_channels.len()
            ));
            return report;
        }

        let indexed_channels: usize = self.group_channels.iter().sum();
        if indexed_channels != self.response.len() {
            report.add(format!(
                "number of indexed channels ({indexed_channels}) not equal to response array ({})",
                self.response.len()
            ));
        }
        if self.response_derivatives && self.response_derivative.len() != self.response.len() {
            report.add(format!(
                "derivative array has length {}, response array {}",
                self.response_derivative.len(),
                self.response.len()
            ));
        }

        let mut group = 0;
        for (component, groups) in self.component_groups.iter().copied().enumerate() {
            let channels = self.component_channels[component];
            for bin in 0..groups {
                if self.group_energy_low[group] >= self.group_energy_high[group] {
                    report.add(format!(
                        "energy bin size is not positive for bin {bin} of component {component}"
                    ));
                }
                if bin > 0 && self.group_energy_low[group] < self.group_energy_low[group - 1] {
                    report.add(format!(
                        "energy grid is not increasing for bin {bin} of component {component}"
                    ));
                }
                let width = self.group_channels[group];
                let first = self.group_first_channel[group];
                let last = self.group_last_channel[group];
                if width > 0 && first < 1 {
                    report.add(format!(
                        "group {group} has first channel {first}, which is not allowed"
                    ));
                } else if width > 0 && last > channels {
                    report.add(format!(
                        "group {group} has last channel {last} beyond the {channels} channels of component {component}"
                    ));
                } else if last < first {
                    report.add(format!(
                        "group {group} has last channel {last} smaller than first channel {first}"
                    ));
                } else if width > 0 && width != last - first + 1 {
                    report.add(format!(
                        "group {group} covers {} channels but declares {width}",
                        last - first + 1
                    ));
                }
                group += 1;
            }
        }

        if self.response.iter().any(|value| *value < 0.0) {
            report.add("negative response value detected in matrix");
        }
        report
    }

    /// Read a matrix from the SPEX_RESP_ICOMP, SPEX_RESP_GROUP, and
    /// SPEX_RESP_RESP tables.
    pub fn read_from(store: &dyn TabularStore) -> SpexResult<Self> {
        let icomp = store.read_table("SPEX_RESP_ICOMP")?;
        let sector_count = icomp.int_header("NSECTOR")? as usize;
        let region_count = icomp.int_header("NREGION")? as usize;
        let shared_components = icomp.bool_header("SHARECOM")?;
        let area_scaling = icomp.bool_header("AREASCAL")?;
        let response_derivatives = icomp.bool_header("RESPDER")?;

        let as_usize = |values: &[i64]| values.iter().map(|value| *value as usize).collect::<Vec<_>>();

        let component_channels = as_usize(icomp.int_column("NCHAN")?);
        let component_groups = as_usize(icomp.int_column("NEG")?);
        let sector = as_usize(icomp.int_column("SECTOR")?);
        let region = as_usize(icomp.int_column("REGION")?);
        let shared_component = if shared_components {
            as_usize(icomp.int_column("SHCOMP")?)
        } else {
            Vec::new()
        };

        let group = store.read_table("SPEX_RESP_GROUP")?;
        let group_energy_low = group.float_column("EG1")?.to_vec();
        let group_energy_high = group.float_column("EG2")?.to_vec();
        let group_first_channel = as_usize(group.int_column("IC1")?);
        let group_last_channel = as_usize(group.int_column("IC2")?);
        let group_channels = as_usize(group.int_column("NC")?);
        let group_relative_area = if area_scaling {
            group.float_column("RELAREA")?.to_vec()
        } else {
            Vec::new()
        };

        let resp = store.read_table("SPEX_RESP_RESP")?;
        let response = resp.float_column("Response")?.to_vec();
        let response_derivative = if response_derivatives {
            resp.float_column("Response_Der")?.to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            component_channels,
            component_groups,
            sector,
            region,
            shared_component,
            group_energy_low,
            group_energy_high,
            group_first_channel,
            group_last_channel,
            group_channels,
            group_relative_area,
            response,
            response_derivative,
            shared_components,
            area_scaling,
            response_derivatives,
            sector_count,
            region_count,
            swapped: false,
        })
    }

    /// Write the matrix. A failing [`ResponseMatrix::check`] is fatal and
    /// nothing is written.
    pub fn write_to(&self, store: &mut dyn TabularStore) -> SpexResult<()> {
        self.check().into_result("response matrix")?;

        let as_int = |values: &[usize]| values.iter().map(|value| *value as i64).collect::<Vec<_>>();

        let mut icomp = Table::new("SPEX_RESP_ICOMP")
            .with_header("NSECTOR", HeaderValue::Int(self.sector_count as i64))
            .with_header("NREGION", HeaderValue::Int(self.region_count as i64))
            .with_header("NCOMP", HeaderValue::Int(self.component_count() as i64))
            .with_header("SHARECOM", HeaderValue::Bool(self.shared_components))
            .with_header("AREASCAL", HeaderValue::Bool(self.area_scaling))
            .with_header("RESPDER", HeaderValue::Bool(self.response_derivatives))
            .with_column("NCHAN", Column::Int(as_int(&self.component_channels)))
            .with_column("NEG", Column::Int(as_int(&self.component_groups)))
            .with_column("SECTOR", Column::Int(as_int(&self.sector)))
            .with_column("REGION", Column::Int(as_int(&self.region)));
        if self.shared_components {
            icomp = icomp.with_column("SHCOMP", Column::Int(as_int(&self.shared_component)));
        }
        store.write_table(icomp)?;

        let mut group = Table::new("SPEX_RESP_GROUP")
            .with_column("EG1", Column::Float(self.group_energy_low.clone()))
            .with_column("EG2", Column::Float(self.group_energy_high.clone()))
            .with_column("IC1", Column::Int(as_int(&self.group_first_channel)))
            .with_column("IC2", Column::Int(as_int(&self.group_last_channel)))
            .with_column("NC", Column::Int(as_int(&self.group_channels)));
        if self.area_scaling {
            group = group.with_column("RELAREA", Column::Float(self.group_relative_area.clone()));
        }
        store.write_table(group)?;

        let mut resp =
            Table::new("SPEX_RESP_RESP").with_column("Response", Column::Float(self.response.clone()));
        if self.response_derivatives {
            resp = resp.with_column(
                "Response_Der",
                Column::Float(self.response_derivative.clone()),
            );
        }
        store.write_table(resp)?;
        Ok(())
    }
}

fn drain_range<T>(values: &mut Vec<T>, range: Range<usize>) {
    values.drain(range);
}
