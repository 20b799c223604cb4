/// ASPRS LAS classification codes and display names
pub struct ClassInfo {
    pub id: u8,
    pub name: &'static str,
}

pub const CLASS_MAP: &[ClassInfo] = &[
    ClassInfo {
        id: 0,
        name: "created, never classified",
    },
    ClassInfo {
        id: 1,
        name: "unclassified",
    },
    ClassInfo {
        id: 2,
        name: "ground",
    },
    ClassInfo {
        id: 3,
        name: "low vegetation",
    },
    ClassInfo {
        id: 4,
        name: "medium vegetation",
    },
    ClassInfo {
        id: 5,
        name: "high vegetation",
    },
    ClassInfo {
        id: 6,
        name: "building",
    },
    ClassInfo {
        id: 7,
        name: "low point (noise)",
    },
    ClassInfo {
        id: 8,
        name: "model key-point",
    },
    ClassInfo {
        id: 9,
        name: "water",
    },
    ClassInfo {
        id: 10,
        name: "rail",
    },
    ClassInfo {
        id: 11,
        name: "road surface",
    },
    ClassInfo {
        id: 12,
        name: "overlap points",
    },
    ClassInfo {
        id: 13,
        name: "wire - guard",
    },
    ClassInfo {
        id: 14,
        name: "wire - conductor",
    },
    ClassInfo {
        id: 15,
        name: "transmission tower",
    },
    ClassInfo {
        id: 16,
        name: "wire-structure connector",
    },
    ClassInfo {
        id: 17,
        name: "bridge deck",
    },
    ClassInfo {
        id: 18,
        name: "high noise",
    },
];

pub fn get_class_name(id: u8) -> String {
    CLASS_MAP
        .iter()
        .find(|c| c.id == id)
        .map_or_else(|| format!("class {}", id), |c| c.name.to_string())
}
