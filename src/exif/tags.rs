use little_exif::exif_tag::ExifTag;

/// A sidecar key that maps one-to-one onto a text EXIF tag.
pub struct TextTag {
    /// Sidecar key, spelled as the EXIF tag name.
    pub name: &'static str,
    /// Tag ID, used to recognize the tag when reading back.
    pub id: u16,
    pub build: fn(String) -> ExifTag,
}

/// Sidecar keys copied verbatim into EXIF. Anything not listed here is only
/// kept inside the UserComment JSON.
pub const TEXT_TAGS: &[TextTag] = &[
    TextTag {
        name: "ImageDescription",
        id: 0x010E,
        build: ExifTag::ImageDescription,
    },
    TextTag {
        name: "Make",
        id: 0x010F,
        build: ExifTag::Make,
    },
    TextTag {
        name: "Model",
        id: 0x0110,
        build: ExifTag::Model,
    },
    TextTag {
        name: "Software",
        id: 0x0131,
        build: ExifTag::Software,
    },
    TextTag {
        name: "Artist",
        id: 0x013B,
        build: ExifTag::Artist,
    },
    TextTag {
        name: "Copyright",
        id: 0x8298,
        build: ExifTag::Copyright,
    },
    TextTag {
        name: "OffsetTimeOriginal",
        id: 0x9011,
        build: ExifTag::OffsetTimeOriginal,
    },
    TextTag {
        name: "CameraOwnerName",
        id: 0xA430,
        build: ExifTag::OwnerName,
    },
    TextTag {
        name: "BodySerialNumber",
        id: 0xA431,
        build: ExifTag::SerialNumber,
    },
    TextTag {
        name: "LensMake",
        id: 0xA433,
        build: ExifTag::LensMake,
    },
    TextTag {
        name: "LensModel",
        id: 0xA434,
        build: ExifTag::LensModel,
    },
    TextTag {
        name: "LensSerialNumber",
        id: 0xA435,
        build: ExifTag::LensSerialNumber,
    },
];

/// Look up a sidecar key. Matching is case-sensitive, like EXIF tag names.
pub fn text_tag(name: &str) -> Option<&'static TextTag> {
    TEXT_TAGS.iter().find(|t| t.name == name)
}

/// Look up a tag ID read back from a file.
pub fn text_tag_by_id(id: u16) -> Option<&'static TextTag> {
    TEXT_TAGS.iter().find(|t| t.id == id)
}
