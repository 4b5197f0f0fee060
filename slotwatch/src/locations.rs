//! Static registry of watchable locations.
//!
//! The inventory provider is addressed by merchant ID; watches reference
//! locations by a stable key. Reservation type IDs come from the provider's
//! type discovery and are needed for booking.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One inventory-provider location.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub key: &'static str,
    pub merchant_id: u32,
    pub reservation_type_id: u32,
    pub name: &'static str,
}

static LOCATIONS: &[Location] = &[
    Location { key: "peachtree", merchant_id: 278258, reservation_type_id: 1681, name: "Houston's - Peachtree" },
    Location { key: "west_paces", merchant_id: 278259, reservation_type_id: 1682, name: "Houston's - West Paces" },
    Location { key: "houston_s_bergen_county", merchant_id: 278171, reservation_type_id: 1703, name: "Houston's - Bergen County" },
    Location { key: "houston_s_boca_raton", merchant_id: 278275, reservation_type_id: 1704, name: "Houston's - Boca Raton" },
    Location { key: "houston_s_saint_charles", merchant_id: 278261, reservation_type_id: 1701, name: "Houston's - Saint Charles" },
    Location { key: "houston_s_north_miami_beach", merchant_id: 278271, reservation_type_id: 1692, name: "Houston's - North Miami Beach" },
    Location { key: "houston_s_pasadena", merchant_id: 278270, reservation_type_id: 1696, name: "Houston's - Pasadena" },
    Location { key: "houston_s_pompano_beach", merchant_id: 278276, reservation_type_id: 1697, name: "Houston's - Pompano Beach" },
    Location { key: "scottsdale", merchant_id: 278256, reservation_type_id: 1685, name: "Houston's - Scottsdale" },
    Location { key: "hillstone_phoenix", merchant_id: 278170, reservation_type_id: 1662, name: "Hillstone - Phoenix" },
    Location { key: "hillstone_bal_harbour", merchant_id: 278242, reservation_type_id: 1702, name: "Hillstone - Bal Harbour" },
    Location { key: "hillstone_coral_gables", merchant_id: 278173, reservation_type_id: 1664, name: "Hillstone - Coral Gables" },
    Location { key: "hillstone_winter_park", merchant_id: 278257, reservation_type_id: 1684, name: "Hillstone - Winter Park" },
    Location { key: "hillstone_denver", merchant_id: 278243, reservation_type_id: 1691, name: "Hillstone - Denver" },
    Location { key: "hillstone_park_cities", merchant_id: 278264, reservation_type_id: 1694, name: "Hillstone - Park Cities" },
    Location { key: "hillstone_houston", merchant_id: 278244, reservation_type_id: 1683, name: "Hillstone - Houston" },
    Location { key: "hillstone_park_avenue", merchant_id: 278278, reservation_type_id: 1695, name: "Hillstone - Park Avenue" },
    Location { key: "hillstone_embarcadero", merchant_id: 278172, reservation_type_id: 1663, name: "Hillstone - San Francisco" },
    Location { key: "hillstone_santa_monica", merchant_id: 278267, reservation_type_id: 1689, name: "Hillstone - Santa Monica" },
    Location { key: "rd_kitchen_newport_beach", merchant_id: 278273, reservation_type_id: 1707, name: "R+D Kitchen - Newport Beach" },
    Location { key: "rd_kitchen_santa_monica", merchant_id: 278268, reservation_type_id: 4514, name: "R+D Kitchen - Santa Monica" },
    Location { key: "rd_kitchen_yountville", merchant_id: 278254, reservation_type_id: 1675, name: "R+D Kitchen - Yountville" },
    Location { key: "honor_bar_dallas", merchant_id: 278262, reservation_type_id: 4240, name: "Honor Bar - Dallas" },
    Location { key: "palm_beach_grill", merchant_id: 278274, reservation_type_id: 1693, name: "Palm Beach Grill" },
    Location { key: "bandera_corona_del_mar", merchant_id: 278245, reservation_type_id: 1705, name: "Bandera - Corona del Mar" },
    Location { key: "south_beverly_grill", merchant_id: 278269, reservation_type_id: 1700, name: "South Beverly Grill" },
    Location { key: "cherry_creek_grill", merchant_id: 278239, reservation_type_id: 1690, name: "Cherry Creek Grill" },
    Location { key: "rutherford_grill", merchant_id: 278253, reservation_type_id: 1676, name: "Rutherford Grill" },
    Location { key: "los_altos_grill", merchant_id: 278255, reservation_type_id: 1677, name: "Los Altos Grill" },
    Location { key: "east_hampton_grill", merchant_id: 278240, reservation_type_id: 1706, name: "East Hampton Grill" },
];

static BY_KEY: Lazy<HashMap<&'static str, &'static Location>> =
    Lazy::new(|| LOCATIONS.iter().map(|loc| (loc.key, loc)).collect());

/// Look up a location by its watch key.
pub fn lookup(key: &str) -> Option<&'static Location> {
    BY_KEY.get(key).copied()
}

/// Display name for a location key, falling back to the key itself for
/// unknown locations (stale watches survive registry edits).
pub fn display_name(key: &str) -> &str {
    lookup(key).map(|loc| loc.name).unwrap_or(key)
}
