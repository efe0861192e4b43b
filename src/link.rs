use crate::light::LightState;
use crate::math::{LineSegment2d, Point2d};
use crate::{EdgeId, LinkId, VehicleId, VehicleSet};

/// The traffic control at the stop line at the end of a link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrafficControl {
    /// No control, vehicles may always proceed.
    #[default]
    Open,
    /// Controlled by a traffic signal.
    Signal(LightState),
}

/// A link represents a single lane of traffic.
#[derive(Clone, Debug)]
pub struct Link {
    /// The link ID.
    id: LinkId,
    /// The edge the link belongs to.
    edge: EdgeId,
    /// The lane index within the edge, 0 being the rightmost lane.
    index: usize,
    /// The geometry of the link.
    segment: LineSegment2d,
    /// The length of the link in m.
    length: f64,
    /// The links that succeed this one.
    links_out: Vec<LinkId>,
    /// The speed limit given by the network, in m/s.
    default_speed_limit: f64,
    /// Temporary limits by owner, oldest first. The newest one is in force.
    limit_overrides: Vec<(String, f64)>,
    /// The traffic control at the end of the link.
    control: TrafficControl,
    /// The vehicles on the link, ordered from the start of the link to the end.
    vehicles: Vec<VehicleId>,
}

/// The attributes of a link.
pub struct LinkAttributes {
    pub edge: EdgeId,
    pub index: usize,
    /// The centre line of the link.
    pub segment: LineSegment2d,
    /// Overrides the geometric length of the link, in m.
    pub length: Option<f64>,
    /// The speed limit in m/s.
    pub speed_limit: f64,
}

impl Link {
    /// Creates a new link.
    pub(crate) fn new(id: LinkId, attribs: &LinkAttributes) -> Self {
        Self {
            id,
            edge: attribs.edge,
            index: attribs.index,
            segment: attribs.segment,
            length: attribs.length.unwrap_or_else(|| attribs.segment.length()),
            links_out: vec![],
            default_speed_limit: attribs.speed_limit,
            limit_overrides: vec![],
            control: TrafficControl::Open,
            vehicles: vec![],
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    /// The edge this link is a lane of.
    pub fn edge(&self) -> EdgeId {
        self.edge
    }

    /// The lane index within the edge.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Gets the length of the link in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The speed limit in force on the link, in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.limit_overrides
            .last()
            .map_or(self.default_speed_limit, |(_, limit)| *limit)
    }

    /// The traffic control at the end of the link.
    pub fn control(&self) -> TrafficControl {
        self.control
    }

    /// The links that succeed this one.
    pub fn links_out(&self) -> &[LinkId] {
        &self.links_out
    }

    /// The vehicles on this link, from the start of the link to the end.
    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// The world coordinates of the point `pos` metres along the link.
    pub fn world_pos(&self, pos: f64) -> Point2d {
        let scale = self.segment.length() / self.length;
        self.segment.sample(pos * scale)
    }

    /// Overrides the speed limit on behalf of `owner`, replacing any
    /// override it set before.
    pub(crate) fn set_speed_limit(&mut self, owner: &str, speed_limit: f64) {
        self.clear_speed_limit(owner);
        self.limit_overrides.push((owner.to_string(), speed_limit));
    }

    /// Drops the override set by `owner`. Overrides of other owners stay.
    pub(crate) fn clear_speed_limit(&mut self, owner: &str) {
        self.limit_overrides.retain(|(o, _)| o != owner);
    }

    pub(crate) fn set_control(&mut self, control: TrafficControl) {
        self.control = control;
    }

    /// Adds a successor link.
    pub(crate) fn add_link_out(&mut self, link_id: LinkId) {
        if !self.links_out.contains(&link_id) {
            self.links_out.push(link_id);
        }
    }

    /// Inserts the vehicle with the given ID into the link.
    pub(crate) fn insert_vehicle(&mut self, vehicles: &VehicleSet, id: VehicleId) {
        let veh_pos = vehicles[id].pos_mid();
        let idx = self
            .vehicles
            .iter()
            .map(|id| vehicles[*id].pos_mid())
            .position(|pos| pos > veh_pos)
            .unwrap_or(self.vehicles.len());
        self.vehicles.insert(idx, id);
    }

    /// Removes the vehicle with the given ID from the link.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(idx) = self.vehicles.iter().rposition(|v| *v == id) {
            self.vehicles.remove(idx);
        }
    }

    /// Restores the ordering of the vehicles after they have moved.
    pub(crate) fn sort_vehicles(&mut self, vehicles: &VehicleSet) {
        self.vehicles
            .sort_by(|a, b| vehicles[*a].pos_mid().total_cmp(&vehicles[*b].pos_mid()));
    }

    /// The rearmost vehicle on the link, if there is one.
    pub(crate) fn last_vehicle(&self) -> Option<VehicleId> {
        self.vehicles.first().copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Point2d;
    use slotmap::KeyData;

    fn link() -> Link {
        let attribs = LinkAttributes {
            edge: EdgeId::from(KeyData::from_ffi(1)),
            index: 0,
            segment: LineSegment2d::from_ends(Point2d::new(0.0, 0.0), Point2d::new(100.0, 0.0)),
            length: None,
            speed_limit: 25.0,
        };
        Link::new(LinkId::from(KeyData::from_ffi(1)), &attribs)
    }

    #[test]
    fn overrides_are_kept_per_owner() {
        let mut link = link();
        link.set_speed_limit("roadworks", 19.0);
        link.set_speed_limit("incident", 1.5);
        assert_eq!(link.speed_limit(), 1.5);

        link.clear_speed_limit("incident");
        assert_eq!(link.speed_limit(), 19.0);
        link.clear_speed_limit("vsl");
        assert_eq!(link.speed_limit(), 19.0);
        link.clear_speed_limit("roadworks");
        assert_eq!(link.speed_limit(), 25.0);
    }

    #[test]
    fn resetting_an_override_makes_it_current() {
        let mut link = link();
        link.set_speed_limit("vsl", 16.0);
        link.set_speed_limit("roadworks", 19.0);
        link.set_speed_limit("vsl", 11.0);
        assert_eq!(link.speed_limit(), 11.0);
        link.clear_speed_limit("vsl");
        assert_eq!(link.speed_limit(), 19.0);
    }
}
