//! Leica SCN slide description.
//!
//! Directory 0 of an SCN container carries an XML document in its
//! `ImageDescription` tag:
//!
//! ```text
//! <scn xmlns="http://www.leica-microsystems.com/scn/2010/10/01">
//!   <collection sizeX=".." sizeY="..">
//!     <image>
//!       <view sizeX=".." sizeY=".." .../>
//!       <scanSettings><channelSettings><channel name="DAPI" .../></channelSettings></scanSettings>
//!       <pixels sizeX=".." sizeY="..">
//!         <dimension r="0" c="0" ifd="1" .../>
//!         ...
//!       </pixels>
//!     </image>
//!     ...
//!   </collection>
//! </scn>
//! ```
//!
//! Resolving the document yields a [`Selection`]: the full-resolution
//! (`r == 0`) directory of every channel of every real field. The macro
//! overview is stored as an image of its own whose view has the collection's
//! size; it is recognised by that and skipped.

use std::collections::{HashMap, HashSet};
use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;

use crate::error::MetadataError;

// =============================================================================
// Channel
// =============================================================================

/// Colour component a fluorescence channel is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "u8")]
pub enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Map a `c` attribute to a channel.
    pub fn from_id(id: u64) -> Result<Self, MetadataError> {
        match id {
            0 => Ok(Channel::Red),
            1 => Ok(Channel::Green),
            2 => Ok(Channel::Blue),
            other => Err(MetadataError::InvalidChannel(other)),
        }
    }

    /// Numeric id as used in metadata and output file names.
    #[inline]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Byte offset of this component within an RGBA pixel.
    #[inline]
    pub const fn offset(self) -> usize {
        self as usize
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.id()
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Overview dimensions declared on `<collection>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionSize {
    #[serde(rename = "sizeX")]
    pub size_x: u64,
    #[serde(rename = "sizeY")]
    pub size_y: u64,
}

/// One directory to extract and the plane it becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectionEntry {
    /// 0-based position in the IFD chain
    #[serde(rename = "ifd")]
    pub directory: u64,
    pub channel: Channel,
    /// Ordinal of the accepted image
    #[serde(rename = "image")]
    pub field: u32,
}

/// Resolved slide description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub collection: CollectionSize,

    /// Entries in document order, channels ascending within a field
    pub entries: Vec<SelectionEntry>,

    /// `<image>` elements in the document
    pub images_seen: usize,

    /// Images that passed the view filter
    pub images_accepted: usize,

    /// Channel names of the first accepted image, for diagnostics
    pub channel_names: Vec<String>,
}

impl Selection {
    /// Resolve an SCN XML description.
    pub fn resolve(xml: &str) -> Result<Self, MetadataError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut resolver = Resolver::default();
        let mut stack: Vec<String> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| MetadataError::Xml {
                position: reader.error_position() as u64,
                message: e.to_string(),
            })?;

            match event {
                Event::Start(e) => {
                    let name = local_name(&e);
                    resolver.open(&name, &stack, &e)?;
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    resolver.open(&name, &stack, &e)?;
                    resolver.close(&name)?;
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    stack.pop();
                    resolver.close(&name)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(MetadataError::Xml {
                position: reader.buffer_position() as u64,
                message: format!("document ends inside <{}>", open),
            });
        }

        resolver.finish()
    }

    /// Lookup from directory position to entry.
    pub fn by_directory(&self) -> HashMap<u64, SelectionEntry> {
        self.entries.iter().map(|e| (e.directory, *e)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "collection sizeX={} sizeY={} images={} accepted={}",
            self.collection.size_x, self.collection.size_y, self.images_seen, self.images_accepted
        )?;
        for entry in &self.entries {
            writeln!(
                f,
                "image={} channel={} ifd={}",
                entry.field,
                entry.channel.id(),
                entry.directory
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// Resolver state
// =============================================================================

/// What has been learned about the `<image>` being parsed.
#[derive(Debug, Default)]
struct ImageAccumulator {
    views: Vec<(u64, u64)>,
    /// Full-resolution directory per channel, last one wins
    directories: [Option<u64>; 3],
    channel_names: Vec<String>,
}

impl ImageAccumulator {
    /// An image is a real field when every view differs from the collection
    /// overview on both axes.
    fn is_field(&self, collection: CollectionSize) -> bool {
        !self.views.is_empty()
            && self
                .views
                .iter()
                .all(|&(x, y)| x != collection.size_x && y != collection.size_y)
    }

    fn entries(&self, field: u32) -> impl Iterator<Item = SelectionEntry> + '_ {
        Channel::ALL.into_iter().filter_map(move |channel| {
            self.directories[channel.offset()].map(|directory| SelectionEntry {
                directory,
                channel,
                field,
            })
        })
    }
}

#[derive(Debug, Default)]
struct Resolver {
    collection: Option<CollectionSize>,
    image: Option<ImageAccumulator>,
    next_field: u32,
    images_seen: usize,
    entries: Vec<SelectionEntry>,
    channel_names: Vec<String>,
}

impl Resolver {
    fn open(&mut self, name: &str, stack: &[String], e: &BytesStart<'_>) -> Result<(), MetadataError> {
        let parent = stack.last().map(String::as_str);

        match name {
            "collection" => {
                if self.collection.is_some() {
                    return Err(MetadataError::DuplicateElement("collection"));
                }
                let attrs = Attributes::read("collection", e)?;
                self.collection = Some(CollectionSize {
                    size_x: attrs.number("sizeX")?,
                    size_y: attrs.number("sizeY")?,
                });
            }
            "image" => {
                self.images_seen += 1;
                self.image = Some(ImageAccumulator::default());
            }
            "view" if parent == Some("image") => {
                if let Some(image) = self.image.as_mut() {
                    let attrs = Attributes::read("view", e)?;
                    image.views.push((attrs.number("sizeX")?, attrs.number("sizeY")?));
                }
            }
            "dimension" if parent == Some("pixels") => {
                if let Some(image) = self.image.as_mut() {
                    let attrs = Attributes::read("dimension", e)?;
                    if attrs.number("r")? == 0 {
                        let channel = Channel::from_id(attrs.number("c")?)?;
                        image.directories[channel.offset()] = Some(attrs.number("ifd")?);
                    } else {
                        attrs.optional_number("c")?;
                        attrs.optional_number("ifd")?;
                    }
                }
            }
            "channel" if parent == Some("channelSettings") => {
                if let Some(image) = self.image.as_mut() {
                    let attrs = Attributes::read("channel", e)?;
                    if let Some(name) = attrs.get("name") {
                        image.channel_names.push(name.to_string());
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<(), MetadataError> {
        if name != "image" {
            return Ok(());
        }
        let Some(image) = self.image.take() else {
            return Ok(());
        };
        let collection = self
            .collection
            .ok_or(MetadataError::MissingElement("collection"))?;

        if image.is_field(collection) {
            self.entries.extend(image.entries(self.next_field));
            self.next_field += 1;
            if self.channel_names.is_empty() {
                self.channel_names = image.channel_names;
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Selection, MetadataError> {
        let collection = self
            .collection
            .ok_or(MetadataError::MissingElement("collection"))?;

        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !seen.insert(entry.directory) {
                return Err(MetadataError::DuplicateDirectory(entry.directory));
            }
        }

        Ok(Selection {
            collection,
            entries: self.entries,
            images_seen: self.images_seen,
            images_accepted: self.next_field as usize,
            channel_names: self.channel_names,
        })
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

// =============================================================================
// Attribute access
// =============================================================================

/// Attributes of one element, keyed by local name.
struct Attributes {
    element: &'static str,
    values: Vec<(String, String)>,
}

impl Attributes {
    fn read(element: &'static str, e: &BytesStart<'_>) -> Result<Self, MetadataError> {
        let mut values = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| MetadataError::Xml {
                position: 0,
                message: format!("<{}>: {}", element, err),
            })?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            values.push((key, value));
        }
        Ok(Self { element, values })
    }

    fn get(&self, attribute: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == attribute)
            .map(|(_, value)| value.as_str())
    }

    fn number(&self, attribute: &'static str) -> Result<u64, MetadataError> {
        self.optional_number(attribute)?
            .ok_or(MetadataError::MissingAttribute {
                element: self.element,
                attribute,
            })
    }

    fn optional_number(&self, attribute: &'static str) -> Result<Option<u64>, MetadataError> {
        let Some(raw) = self.get(attribute) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| MetadataError::InvalidAttribute {
                element: self.element,
                attribute,
                value: raw.to_string(),
            })
    }
}

// =============================================================================
// Tests
// =============================================================================
