use crate::network::Network;
use crate::EdgeId;

/// Finds the quickest route from one edge to another under free-flow conditions,
/// including both end edges.
pub fn shortest_path(network: &Network, src: EdgeId, dst: EdgeId) -> Option<Vec<EdgeId>> {
    pathfinding::directed::dijkstra::dijkstra(
        &src,
        |id| successors(*id, network),
        |id| *id == dst,
    )
    .map(|(route, _)| route)
}

fn successors(edge_id: EdgeId, network: &Network) -> impl Iterator<Item = (EdgeId, usize)> + '_ {
    network.edge(edge_id).successors().iter().map(move |id| {
        let edge = network.edge(*id);
        let cost = (10. * edge.length() / edge.default_speed_limit()) as usize;
        (*id, cost)
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::test::corridor;

    #[test]
    fn finds_route_along_corridor() {
        let network = Network::from_def(&corridor()).unwrap();
        let id = |name| network.edge_id(name).unwrap();
        assert_eq!(
            shortest_path(&network, id("s"), id("c")),
            Some(vec![id("s"), id("b"), id("c")])
        );
        assert_eq!(shortest_path(&network, id("c"), id("a")), None);
    }
}
