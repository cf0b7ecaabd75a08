#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CameraAngle {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub prompt_mod: &'static str,
}

pub const DEFAULT_CAMERA_ANGLE: &str = "eye-level";

pub const CAMERA_ANGLES: &[CameraAngle] = &[
    CameraAngle {
        id: "eye-level",
        label: "Eye Level",
        description: "Connection and trust",
        prompt_mod: "Shot at eye-level, approachable, trustworthy",
    },
    CameraAngle {
        id: "low-angle",
        label: "Heroic Low",
        description: "Power and authority",
        prompt_mod: "Low angle shot looking up, heroic, empowering",
    },
    CameraAngle {
        id: "overhead",
        label: "Flat Lay",
        description: "Product detail",
        prompt_mod: "Overhead flat lay shot, organized, clean composition",
    },
    CameraAngle {
        id: "dutch",
        label: "Dutch Angle",
        description: "Dynamism",
        prompt_mod: "Dutch angle (tilted), dynamic energy, edgy",
    },
    CameraAngle {
        id: "macro",
        label: "Macro Detail",
        description: "Quality and texture",
        prompt_mod: "Macro close-up shot, focus on texture",
    },
];

pub fn camera_angle(id: &str) -> Option<&'static CameraAngle> {
    let wanted = id.trim();
    CAMERA_ANGLES
        .iter()
        .find(|angle| angle.id.eq_ignore_ascii_case(wanted))
}

/// Prompt modifier for a preset id; unknown ids yield an empty modifier.
pub fn style_modifier_for(id: &str) -> &'static str {
    camera_angle(id).map(|angle| angle.prompt_mod).unwrap_or("")
}
