pub mod altitude;
pub mod intersection;
pub mod models;
pub mod route_corrector;
pub mod spatial;

pub use altitude::{limit_to_ft_amsl, normalize_band, parse_number, AltitudeReference};
pub use intersection::{classify_segment, segment_distance, segment_intersects, segment_line};
pub use models::{
    normalize_icao_class, AerodromeInfo, AerodromeStatus, AirspaceIntersection, AirspaceType, CorrectedWaypoint,
    FrequencyInfo, ImportedWaypoint, IntersectionType, Leg, LegAirspaces, RoutePoint, RunwayInfo,
    ServiceInfo, WaypointSource,
};
pub use route_corrector::{correct_route, legs_from_corrected, CorrectorConfig};
pub use spatial::{haversine_nm, nm_to_degrees, tile_bbox, BoundingBox};
