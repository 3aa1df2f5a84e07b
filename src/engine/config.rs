// Rule constants for the combat engine.

// Up-check thresholds (cumulative wounds, inclusive)
pub const PC_UP_CHECK_THRESHOLD: i32 = 35;
pub const BOSS_UP_CHECK_THRESHOLD: i32 = 50;

// Boost
pub const BOOST_SHOT_COST: i32 = 3;
pub const BOOST_ATTACK_BONUS: i32 = 1;
pub const BOOST_ATTACK_FORTUNE_BONUS: i32 = 2;
pub const BOOST_DEFENSE_BONUS: i32 = 3;
pub const BOOST_DEFENSE_FORTUNE_BONUS: i32 = 5;
pub const BOOST_EFFECT_NAME: &str = "Boost";

// Status tags
pub const STATUS_UP_CHECK_REQUIRED: &str = "up_check_required";
pub const STATUS_OUT_OF_FIGHT: &str = "out_of_fight";

// Action value keys
pub const AV_TYPE: &str = "Type";
pub const AV_WOUNDS: &str = "Wounds";
pub const AV_FORTUNE: &str = "Fortune";
pub const AV_DEFENSE: &str = "Defense";
pub const AV_MAIN_ATTACK: &str = "MainAttack";
pub const AV_CHASE_POINTS: &str = "Chase Points";
pub const AV_CONDITION_POINTS: &str = "Condition Points";

pub const DEFAULT_MAIN_ATTACK: &str = "Guns";

/// Chase fields whose updates accumulate onto the stored value.
pub const ADDITIVE_CHASE_KEYS: [&str; 2] = [AV_CHASE_POINTS, AV_CONDITION_POINTS];

// Event types
pub const EVENT_COMBAT_ACTION: &str = "combat_action";
pub const EVENT_CHASE_ACTION: &str = "chase_action";
pub const EVENT_UP_CHECK: &str = "up_check";
pub const EVENT_BOOST: &str = "boost";
pub const EVENT_SEQUENCE: &str = "sequence";
pub const EVENT_JOIN: &str = "join";
