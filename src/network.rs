use crate::detector::DetectorDef;
use crate::light::PhasePlan;
use crate::link::{Link, LinkAttributes};
use crate::math::{LineSegment2d, Point2d};
use crate::{EdgeId, Error, LinkId, LinkSet, Result};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{BTreeMap, HashMap};

/// The lateral spacing between adjacent lanes, in m.
const LANE_WIDTH: f64 = 3.2;

/// The road network, as stored on disk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkDef {
    pub nodes: BTreeMap<String, NodeDef>,
    pub edges: BTreeMap<String, EdgeDef>,
    /// Edge-to-edge connections. When empty, every edge connects to the edges
    /// leaving the node it ends at, except the one leading straight back.
    #[serde(default)]
    pub connections: Vec<ConnectionDef>,
    #[serde(default)]
    pub detectors: BTreeMap<String, DetectorDef>,
    #[serde(default)]
    pub traffic_lights: BTreeMap<String, TrafficLightDef>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct NodeDef {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
    #[serde(default = "one_lane")]
    pub lanes: usize,
    /// Speed limit in m/s.
    pub speed_limit: f64,
    /// Overrides the distance between the two nodes, in m.
    #[serde(default)]
    pub length: Option<f64>,
}

fn one_lane() -> usize {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionDef {
    pub from: String,
    pub to: String,
}

/// A reference to a single lane of an edge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaneRef {
    pub edge: String,
    pub lane: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrafficLightDef {
    /// The lane controlled by each signal index.
    pub controlled: Vec<LaneRef>,
    /// The plan the light runs from the start, if any.
    #[serde(default)]
    pub program: Option<PhasePlan>,
}

/// A road between two nodes, made up of one link per lane.
#[derive(Clone, Debug)]
pub struct Edge {
    id: String,
    from: String,
    to: String,
    length: f64,
    speed_limit: f64,
    lanes: Vec<LinkId>,
    successors: Vec<EdgeId>,
}

impl Edge {
    /// The length of the edge in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The speed limit given by the network, in m/s.
    pub fn default_speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// The lanes of the edge, rightmost first.
    pub fn lanes(&self) -> &[LinkId] {
        &self.lanes
    }

    pub fn successors(&self) -> &[EdgeId] {
        &self.successors
    }
}

/// The road network: edges, their lanes, and how they connect.
#[derive(Clone, Debug, Default)]
pub struct Network {
    edges: SlotMap<EdgeId, Edge>,
    edge_names: HashMap<String, EdgeId>,
    links: LinkSet,
}

impl Network {
    /// Builds the network described by `def`.
    pub fn from_def(def: &NetworkDef) -> Result<Self> {
        let mut network = Network::default();

        for (id, edge) in &def.edges {
            let node = |name: &str| {
                def.nodes
                    .get(name)
                    .map(|n| Point2d::new(n.x, n.y))
                    .ok_or_else(|| Error::unknown("node", name))
            };
            let segment = LineSegment2d::from_ends(node(&edge.from)?, node(&edge.to)?);
            let length = edge.length.unwrap_or_else(|| segment.length());
            if !(length > 0.0) || edge.lanes == 0 || !(edge.speed_limit > 0.0) {
                return Err(Error::Config(format!(
                    "edge '{}' needs a positive length, speed limit and lane count",
                    id
                )));
            }

            let edge_id = network.edges.insert(Edge {
                id: id.clone(),
                from: edge.from.clone(),
                to: edge.to.clone(),
                length,
                speed_limit: edge.speed_limit,
                lanes: vec![],
                successors: vec![],
            });
            let centre = 0.5 * (edge.lanes - 1) as f64;
            let lanes = (0..edge.lanes)
                .map(|index| {
                    let attribs = LinkAttributes {
                        edge: edge_id,
                        index,
                        segment: segment.offset((index as f64 - centre) * LANE_WIDTH),
                        length: Some(length),
                        speed_limit: edge.speed_limit,
                    };
                    network
                        .links
                        .insert_with_key(|link_id| Link::new(link_id, &attribs))
                })
                .collect();
            network.edges[edge_id].lanes = lanes;
            network.edge_names.insert(id.clone(), edge_id);
        }

        let connections = if def.connections.is_empty() {
            network.derived_connections()
        } else {
            def.connections
                .iter()
                .map(|c| Ok((network.edge_id(&c.from)?, network.edge_id(&c.to)?)))
                .collect::<Result<Vec<_>>>()?
        };
        for (from, to) in connections {
            network.connect(from, to);
        }

        Ok(network)
    }

    /// Connections implied by the node topology.
    fn derived_connections(&self) -> Vec<(EdgeId, EdgeId)> {
        let mut connections = vec![];
        for (from_id, from) in &self.edges {
            for (to_id, to) in &self.edges {
                if from_id != to_id && from.to == to.from && to.to != from.from {
                    connections.push((from_id, to_id));
                }
            }
        }
        connections
    }

    /// Connects the end of one edge to the start of another, lane by lane.
    fn connect(&mut self, from: EdgeId, to: EdgeId) {
        if !self.edges[from].successors.contains(&to) {
            self.edges[from].successors.push(to);
        }
        let to_lanes = self.edges[to].lanes.clone();
        let from_lanes = self.edges[from].lanes.clone();
        for (index, link_id) in from_lanes.into_iter().enumerate() {
            let target = to_lanes[usize::min(index, to_lanes.len() - 1)];
            self.links[link_id].add_link_out(target);
        }
    }

    pub fn links(&self) -> &LinkSet {
        &self.links
    }

    pub(crate) fn links_mut(&mut self) -> &mut LinkSet {
        &mut self.links
    }

    pub fn iter_edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter()
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    /// Looks up an edge by name.
    pub fn edge_id(&self, name: &str) -> Result<EdgeId> {
        self.edge_names
            .get(name)
            .copied()
            .ok_or_else(|| Error::unknown("edge", name))
    }

    pub fn has_edge(&self, name: &str) -> bool {
        self.edge_names.contains_key(name)
    }

    /// The name of an edge.
    pub fn edge_name(&self, id: EdgeId) -> &str {
        &self.edges[id].id
    }

    /// Looks up a single lane of an edge.
    pub fn lane(&self, edge: &str, index: usize) -> Result<LinkId> {
        self.edge(self.edge_id(edge)?)
            .lanes
            .get(index)
            .copied()
            .ok_or_else(|| Error::unknown("lane", format!("{}_{}", edge, index)))
    }

    /// Resolves an edge ID to all of its lanes, or a lane ID (`<edge>_<index>`)
    /// to that single lane.
    pub fn resolve_geometry(&self, id: &str) -> Result<Vec<LinkId>> {
        if let Ok(edge_id) = self.edge_id(id) {
            return Ok(self.edges[edge_id].lanes.clone());
        }
        id.rsplit_once('_')
            .and_then(|(edge, index)| self.lane(edge, index.parse().ok()?).ok())
            .map(|link_id| vec![link_id])
            .ok_or_else(|| Error::unknown("edge or lane", id))
    }

    /// The lane of `edge` that a vehicle on `from` continues onto.
    pub(crate) fn next_link(&self, from: LinkId, edge: EdgeId) -> LinkId {
        let link = &self.links[from];
        let lanes = &self.edges[edge].lanes;
        link.links_out()
            .iter()
            .copied()
            .find(|id| self.links[*id].edge() == edge)
            .unwrap_or_else(|| lanes[usize::min(link.index(), lanes.len() - 1)])
    }

    /// The number of vehicles on every lane of an edge.
    /// Overrides the speed limit of a lane on behalf of `owner`, in m/s.
    pub(crate) fn set_lane_speed_limit(&mut self, link: LinkId, owner: &str, speed_limit: f64) {
        self.links[link].set_speed_limit(owner, speed_limit);
    }

    /// Drops `owner`'s override of a lane's speed limit.
    pub(crate) fn clear_lane_speed_limit(&mut self, link: LinkId, owner: &str) {
        self.links[link].clear_speed_limit(owner);
    }

    /// The current speed limit of an edge, taken from its rightmost lane.
    pub fn edge_speed_limit(&self, edge: EdgeId) -> f64 {
        self.links[self.edges[edge].lanes[0]].speed_limit()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use serde_json::json;

    /// A straight corridor `a -> b -> c` with a side road `s -> b`.
    pub(crate) fn corridor() -> NetworkDef {
        serde_json::from_value(json!({
            "nodes": {
                "n0": {"x": 0.0, "y": 0.0},
                "n1": {"x": 200.0, "y": 0.0},
                "n2": {"x": 400.0, "y": 0.0},
                "n3": {"x": 600.0, "y": 0.0},
                "s0": {"x": 100.0, "y": -100.0}
            },
            "edges": {
                "a": {"from": "n0", "to": "n1", "lanes": 2, "speed_limit": 20.0},
                "b": {"from": "n1", "to": "n2", "lanes": 2, "speed_limit": 20.0},
                "c": {"from": "n2", "to": "n3", "speed_limit": 15.0},
                "s": {"from": "s0", "to": "n1", "speed_limit": 10.0}
            }
        }))
        .unwrap()
    }

    #[test]
    fn derives_connections_from_nodes() {
        let network = Network::from_def(&corridor()).unwrap();
        let a = network.edge_id("a").unwrap();
        let b = network.edge_id("b").unwrap();
        let c = network.edge_id("c").unwrap();
        assert_eq!(network.edge(a).successors(), &[b]);
        assert_eq!(network.edge(b).successors(), &[c]);
        assert!(network.edge(c).successors().is_empty());

        // Both lanes of `b` funnel into the single lane of `c`.
        let c_lane = network.lane("c", 0).unwrap();
        for lane in network.edge(b).lanes() {
            assert_eq!(network.next_link(*lane, c), c_lane);
        }
    }

    #[test]
    fn resolves_edges_and_lanes() {
        let network = Network::from_def(&corridor()).unwrap();
        assert_eq!(network.resolve_geometry("a").unwrap().len(), 2);
        let lane = network.resolve_geometry("a_1").unwrap();
        assert_eq!(lane, vec![network.lane("a", 1).unwrap()]);
        assert!(network.resolve_geometry("a_7").is_err());
        assert!(network.resolve_geometry("nowhere").is_err());
    }

    #[test]
    fn rejects_unknown_nodes() {
        let mut def = corridor();
        def.edges.get_mut("c").unwrap().to = "missing".into();
        assert!(Network::from_def(&def).is_err());
    }
}
