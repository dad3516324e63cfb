//! Chat-formatted rendering of ranks and statistics.
//!
//! Colors follow the community convention of grading a value by
//! threshold brackets, one color per bracket.

use crate::stats::PlayerStats;

const STAR_COLORS: [&str; 10] = [
    "§7", "§f", "§6", "§b", "§2", "§3", "§4", "§d", "§9", "§5",
];

/// The colored `[RANK]` prefix for a player, `§7` for no rank.
pub fn rank_prefix(stats: &PlayerStats) -> String {
    let plus = stats
        .plus_color
        .clone()
        .unwrap_or_else(|| "§c".to_owned());
    match stats.rank.as_str() {
        "VIP" => "§a[VIP]".to_owned(),
        "VIP+" => "§a[VIP§6+§a]".to_owned(),
        "MVP" => "§b[MVP]".to_owned(),
        "MVP+" => format!("§b[MVP{}+§b]", plus),
        "MVP++" => format!("§6[MVP{}++§6]", plus),
        "ADMIN" | "OWNER" => format!("§c[{}]", stats.rank),
        "GAME MASTER" => "§2[GM]".to_owned(),
        "YOUTUBE" => "§c[§fYOUTUBE§c]".to_owned(),
        "PIG+++" => "§d[PIG§b+++§d]".to_owned(),
        _ => "§7".to_owned(),
    }
}

/// Rank and name joined the way the tab list shows them. Unranked
/// players get no separating space.
pub fn rankname(stats: &PlayerStats) -> String {
    let rank = rank_prefix(stats);
    if rank == "§7" {
        format!("§7{}", stats.name)
    } else {
        format!("{} {}", rank, stats.name)
    }
}

fn graded(value: f64, bounds: &[(f64, &'static str)], last: &'static str) -> String {
    for (bound, color) in bounds {
        if value < *bound {
            return format!("{}{}", color, value);
        }
    }
    format!("{}{}", last, value)
}

fn graded_int(value: i64, bounds: &[(i64, &'static str)], last: &'static str) -> String {
    for (bound, color) in bounds {
        if value < *bound {
            return format!("{}{}", color, value);
        }
    }
    format!("{}{}", last, value)
}

pub fn bw_star(level: i64) -> String {
    if (0..1000).contains(&level) {
        format!("{}[{}✫]", STAR_COLORS[(level / 100) as usize], level)
    } else {
        // prestige art collapsed to one form
        format!("§7[§6{}§7✪]", level.max(0))
    }
}

pub fn bw_finals(finals: i64) -> String {
    graded_int(
        finals,
        &[
            (1000, "§7"),
            (4000, "§e"),
            (10000, "§2"),
            (25000, "§b"),
            (50000, "§4"),
            (100000, "§5"),
        ],
        "§d",
    )
}

pub fn bw_fkdr(fkdr: f64) -> String {
    graded(
        fkdr,
        &[
            (1.0, "§7"),
            (2.5, "§e"),
            (5.0, "§2"),
            (10.0, "§b"),
            (20.0, "§4"),
            (50.0, "§5"),
            (100.0, "§c"),
            (300.0, "§d"),
            (1000.0, "§9"),
        ],
        "§0",
    )
}

pub fn bw_wins(wins: i64) -> String {
    graded_int(
        wins,
        &[
            (250, "§7"),
            (1000, "§e"),
            (2500, "§2"),
            (8000, "§b"),
            (15000, "§4"),
            (40000, "§5"),
        ],
        "§d",
    )
}

pub fn bw_wlr(wlr: f64) -> String {
    graded(
        wlr,
        &[
            (0.5, "§7"),
            (1.0, "§e"),
            (2.5, "§2"),
            (5.0, "§b"),
            (10.0, "§4"),
            (25.0, "§5"),
            (100.0, "§c"),
            (300.0, "§d"),
            (1000.0, "§9"),
        ],
        "§d",
    )
}

pub fn sw_star(level: i64) -> String {
    if (0..50).contains(&level) {
        format!("{}[{}⋆]", STAR_COLORS[(level / 5) as usize], level)
    } else {
        format!("§7[§f{}⋆§7]", level.max(0))
    }
}

pub fn sw_kills(kills: i64) -> String {
    graded_int(
        kills,
        &[
            (1000, "§7"),
            (5000, "§e"),
            (15000, "§2"),
            (30000, "§b"),
            (50000, "§4"),
            (100000, "§5"),
            (250000, "§c"),
            (500000, "§d"),
        ],
        "§0",
    )
}

pub fn sw_kdr(kdr: f64) -> String {
    graded(
        kdr,
        &[
            (0.75, "§7"),
            (1.5, "§e"),
            (3.0, "§2"),
            (5.0, "§b"),
            (10.0, "§4"),
            (25.0, "§5"),
            (50.0, "§c"),
            (100.0, "§d"),
            (250.0, "§9"),
        ],
        "§0",
    )
}

pub fn sw_wins(wins: i64) -> String {
    graded_int(
        wins,
        &[
            (250, "§7"),
            (1000, "§e"),
            (3000, "§2"),
            (7500, "§b"),
            (15000, "§4"),
            (30000, "§5"),
            (60000, "§c"),
            (100000, "§d"),
        ],
        "§0",
    )
}

pub fn sw_wlr(wlr: f64) -> String {
    graded(
        wlr,
        &[
            (0.1, "§7"),
            (0.2, "§e"),
            (0.4, "§2"),
            (0.75, "§b"),
            (1.0, "§4"),
            (2.5, "§5"),
            (5.0, "§c"),
            (10.0, "§d"),
            (25.0, "§9"),
        ],
        "§0",
    )
}

fn star(stats: &PlayerStats, gamemode: &str) -> String {
    match gamemode {
        "skywars" => sw_star(stats.skywars.level),
        _ => bw_star(stats.bedwars.level),
    }
}

/// One formatted `Stat: value` source value by canonical stat name.
pub fn stat_value(stats: &PlayerStats, gamemode: &str, name: &str) -> String {
    match (gamemode, name) {
        ("bedwars", "Finals") => bw_finals(stats.bedwars.final_kills),
        ("bedwars", "FKDR") => bw_fkdr(stats.bedwars.fkdr),
        ("bedwars", "Wins") => bw_wins(stats.bedwars.wins),
        ("bedwars", "WLR") => bw_wlr(stats.bedwars.wlr),
        ("skywars", "Kills") => sw_kills(stats.skywars.kills),
        ("skywars", "KDR") => sw_kdr(stats.skywars.kdr),
        ("skywars", "Wins") => sw_wins(stats.skywars.wins),
        ("skywars", "WLR") => sw_wlr(stats.skywars.wlr),
        _ => String::new(),
    }
}

/// The `/sc` output line: `<star> <rank><name>` then `Stat: value`
/// segments, all joined on `§f `.
pub fn format_stats(stats: &PlayerStats, gamemode: &str, names: &[&str]) -> String {
    let mut parts = vec![format!("{} {}", star(stats, gamemode), rankname(stats))];
    for name in names {
        parts.push(format!("{}: {}", name, stat_value(stats, gamemode, name)));
    }
    parts.join("§f ")
}

/// The tab display line injected by stat enrichment.
pub fn display_line(stats: &PlayerStats, gamemode: &str) -> String {
    match gamemode {
        "skywars" => format!(
            "{} {} §f | {}",
            sw_star(stats.skywars.level),
            rankname(stats),
            sw_kdr(stats.skywars.kdr)
        ),
        _ => format!(
            "{} {} §f | {}",
            bw_star(stats.bedwars.level),
            rankname(stats),
            bw_fkdr(stats.bedwars.fkdr)
        ),
    }
}
