//! Checklist item catalog
//!
//! The 60 scoring items of the male-figure Draw-A-Person checklist, in
//! display order. Keys are the persisted field names under `items`; their
//! two-digit prefix makes catalog order and lexical order coincide.

/// One checklist item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemDefinition {
    /// Persisted key (e.g. `m01_head`)
    pub key: &'static str,
    /// Human-readable label shown to annotators
    pub label: &'static str,
}

/// Number of checklist items
pub const ITEM_COUNT: usize = 60;

const fn item(key: &'static str, label: &'static str) -> ItemDefinition {
    ItemDefinition { key, label }
}

/// All checklist items in catalog order
pub const ITEMS: [ItemDefinition; ITEM_COUNT] = [
    item("m01_head", "01 Head"),
    item("m02_neck", "02 Neck"),
    item("m03_neck_plane", "03 Neck: two dimensions"),
    item("m04_eyes", "04 Eyes"),
    item("m05_eyebrows", "05 Eye detail: brows or lashes"),
    item("m06_pupils", "06 Eye detail: pupils"),
    item("m07_eye_proportion", "07 Eye detail: proportion"),
    item("m08_eye_gaze", "08 Eye detail: glance"),
    item("m09_nose", "09 Nose"),
    item("m10_nose_plane", "10 Nose: two dimensions"),
    item("m11_mouth", "11 Mouth"),
    item("m12_lips_plane", "12 Lips: two dimensions"),
    item("m13_chin_forehead", "13 Chin and forehead"),
    item("m14_chin_projection", "14 Projection of chin"),
    item("m15_chin_line", "15 Line of jaw"),
    item("m16_nasal_bridge", "16 Bridge of nose"),
    item("m17_hair_i", "17 Hair I"),
    item("m18_hair_ii", "18 Hair II"),
    item("m19_hair_iii", "19 Hair III"),
    item("m20_ears", "20 Ears"),
    item("m21_ear_proportion_position", "21 Ears: proportion and position"),
    item("m22_fingers", "22 Fingers"),
    item("m23_finger_count", "23 Correct number of fingers"),
    item("m24_finger_detail", "24 Detail of fingers correct"),
    item("m25_thumb_differentiation", "25 Opposition of thumb"),
    item("m26_hands", "26 Hands"),
    item("m27_wrist_or_ankle", "27 Wrist or ankle"),
    item("m28_arms", "28 Arms"),
    item("m29_shoulders_i", "29 Shoulders I"),
    item("m30_shoulders_ii", "30 Shoulders II"),
    item("m31_arm_motion", "31 Arms at side or engaged in activity"),
    item("m32_legs", "32 Legs"),
    item("m33_hip_crotch", "33 Hip I (crotch)"),
    item("m34_hip_ii", "34 Hip II"),
    item("m35_knee_joint", "35 Knee joint"),
    item("m36_feet_i", "36 Feet I"),
    item("m37_feet_proportion", "37 Feet II: proportion"),
    item("m38_feet_heel", "38 Feet III: heel"),
    item("m39_feet_perspective", "39 Feet IV: perspective"),
    item("m40_limbs_attached_i", "40 Attachment of arms and legs I"),
    item("m41_limbs_attached_ii", "41 Attachment of arms and legs II"),
    item("m42_torso", "42 Trunk"),
    item("m43_torso_proportion_plane", "43 Trunk in proportion: two dimensions"),
    item("m44_ratio_head_torso", "44 Proportion: head and trunk"),
    item("m45_ratio_face", "45 Proportion: face"),
    item("m46_ratio_arm_torso", "46 Proportion: arms and trunk"),
    item("m47_ratio_arm", "47 Proportion: arms"),
    item("m48_ratio_leg_torso", "48 Proportion: legs and trunk"),
    item("m49_ratio_limb_vs_hand_foot", "49 Proportion: limbs greater than hands and feet"),
    item("m50_clothes_i", "50 Clothing I"),
    item("m51_clothes_ii", "51 Clothing II"),
    item("m52_clothes_iii", "52 Clothing III"),
    item("m53_clothes_iv", "53 Clothing IV"),
    item("m54_profile_view", "54 Profile"),
    item("m55_motor_coordination", "55 Motor coordination: lines and junctures"),
    item("m56_refined_line_head", "56 Refined line and form: head outline"),
    item("m57_refined_line_torso", "57 Refined line and form: trunk outline"),
    item("m58_refined_line_face_shape", "58 Refined line and form: facial features"),
    item("m59_sketch_realism", "59 Sketching and rendering technique"),
    item("m60_limb_motion", "60 Arm and leg movement"),
];

/// Catalog position of `key`, if it is a known item
pub fn index_of(key: &str) -> Option<usize> {
    ITEMS.iter().position(|item| item.key == key)
}

/// Iterate over catalog keys in order
pub fn keys() -> impl Iterator<Item = &'static str> {
    ITEMS.iter().map(|item| item.key)
}
