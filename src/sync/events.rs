// Typed events emitted by the playback engine
use std::fmt;

/// A geometry property observed on the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeometryField {
    OsdMarginTop,
    OsdMarginLeft,
    OsdWidth,
    OsdHeight,
    VideoWidth,
    VideoHeight,
}

impl GeometryField {
    /// All observed fields, in snapshot order.
    pub const ALL: [GeometryField; 6] = [
        GeometryField::OsdMarginTop,
        GeometryField::OsdMarginLeft,
        GeometryField::OsdWidth,
        GeometryField::OsdHeight,
        GeometryField::VideoWidth,
        GeometryField::VideoHeight,
    ];

    /// Player property name for this field
    pub fn property_name(self) -> &'static str {
        match self {
            GeometryField::OsdMarginTop => "osd-dimensions/mt",
            GeometryField::OsdMarginLeft => "osd-dimensions/ml",
            GeometryField::OsdWidth => "osd-dimensions/w",
            GeometryField::OsdHeight => "osd-dimensions/h",
            GeometryField::VideoWidth => "width",
            GeometryField::VideoHeight => "height",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for GeometryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property_name())
    }
}

/// Event delivered from the playback engine to the processing context.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A geometry property changed; `None` means it became unavailable
    GeometryUpdated {
        field: GeometryField,
        value: Option<f64>,
    },
    /// Playback position changed (seconds); `None` while nothing is loaded
    PositionChanged { position: Option<f64> },
    /// A seek completed; placements computed before it are stale
    Seeked,
    /// Playback reached the end of the source
    EndOfFile,
}
