//! OME-XML sidecar.

use std::fmt::Write;

use crate::array::{DataType, PyramidDescriptor};

use super::PhysicalSize;

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

/// Image-level metadata rendered as an OME-XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct OmeMetadata {
    pub name: String,
    pub dtype: DataType,
    pub size_x: u64,
    pub size_y: u64,
    pub size_z: u64,
    pub channel_names: Vec<String>,
    pub pixel_size: Option<PhysicalSize>,
}

impl OmeMetadata {
    /// Describe level 0 of `descriptor`. Channels are named `Channel <i>`
    /// unless `channel_names` supplies a name.
    pub fn from_descriptor(
        descriptor: &PyramidDescriptor,
        name: &str,
        channel_names: &[String],
        pixel_size: Option<PhysicalSize>,
    ) -> Self {
        let base = descriptor.level(0).unwrap_or_default();
        let channel_names = (0..descriptor.channels() as usize)
            .map(|i| {
                channel_names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("Channel {}", i))
            })
            .collect();
        Self {
            name: name.to_string(),
            dtype: descriptor.dtype(),
            size_x: base.x,
            size_y: base.y,
            size_z: base.z,
            channel_names,
            pixel_size,
        }
    }

    /// Render the document. Dimension order is `XYZCT`, matching `(c, z, y, x)`
    /// storage with `x` fastest.
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        let _ = writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        let _ = writeln!(
            xml,
            r#"<OME xmlns="{ns}" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="{ns} {ns}/ome.xsd">"#,
            ns = OME_NAMESPACE
        );
        let _ = writeln!(
            xml,
            r#"  <Image ID="Image:0" Name="{}">"#,
            escape(&self.name)
        );

        let mut pixels = format!(
            r#"    <Pixels ID="Pixels:0" DimensionOrder="XYZCT" Type="{}" SizeX="{}" SizeY="{}" SizeZ="{}" SizeC="{}" SizeT="1""#,
            self.dtype.ome_type(),
            self.size_x,
            self.size_y,
            self.size_z,
            self.channel_names.len()
        );
        if let Some(size) = &self.pixel_size {
            let unit = escape(size.ome_unit());
            let _ = write!(
                pixels,
                r#" PhysicalSizeX="{}" PhysicalSizeXUnit="{unit}" PhysicalSizeY="{}" PhysicalSizeYUnit="{unit}" PhysicalSizeZ="{}" PhysicalSizeZUnit="{unit}""#,
                size.x,
                size.y,
                size.z,
                unit = unit
            );
        }
        pixels.push('>');
        let _ = writeln!(xml, "{}", pixels);

        for (i, name) in self.channel_names.iter().enumerate() {
            let _ = writeln!(
                xml,
                r#"      <Channel ID="Channel:0:{}" Name="{}" SamplesPerPixel="1"><LightPath/></Channel>"#,
                i,
                escape(name)
            );
        }

        let _ = writeln!(xml, "    </Pixels>");
        let _ = writeln!(xml, "  </Image>");
        let _ = writeln!(xml, "</OME>");
        xml
    }
}

/// Escape text for use inside an XML attribute.
fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
