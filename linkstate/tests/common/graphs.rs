use linkstate::framework::{InterfaceConfig, LqAlgorithm, ProtocolParams};

use crate::common::virtual_network::{iface_addr, VirtualNetwork};

pub fn hop_count() -> ProtocolParams {
    ProtocolParams {
        lq_algorithm: LqAlgorithm::HopCount,
        ..Default::default()
    }
}

/// 1 - 2 - 3 - 4
pub fn vnet_line(params: ProtocolParams) -> VirtualNetwork {
    VirtualNetwork::create(&[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 4)], params)
}

/// 1 - 2 - 3
pub fn vnet_short_line(params: ProtocolParams) -> VirtualNetwork {
    VirtualNetwork::create(&[1, 2, 3], &[(1, 2), (2, 3)], params)
}

///   2
///  / \
/// 1 - 3
pub fn vnet_triangle(params: ProtocolParams) -> VirtualNetwork {
    VirtualNetwork::create(&[1, 2, 3], &[(1, 2), (2, 3), (1, 3)], params)
}

/// 1 - 2 - 3, where 3 only hears 2 on its second interface
pub fn vnet_second_interface(params: ProtocolParams) -> VirtualNetwork {
    let mut network = VirtualNetwork::create(&[1, 2, 3], &[(1, 2)], params);
    network.add_interface(3, InterfaceConfig::new(1, iface_addr(3, 1)));
    network.connect((2, 0), (3, 1), true);
    network
}
