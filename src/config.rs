// SPDX-License-Identifier: MPL-2.0
/// Tunables of the shim.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Config {
    /// Maximum physical sectors per vector request advertised to the generic layer
    pub max_phys_sect: u32,
    /// Element size of DMA pools created for the generic layer
    pub dma_pool_size: usize,
    /// Alignment of DMA pool elements
    pub dma_pool_align: usize,
    /// First channel the identify command asks for
    pub identify_chnl_off: u32,
    /// Optional cap, in bytes, on one L2P table request. The transport limit always applies.
    pub max_l2p_transfer: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_phys_sect: 64,
            dma_pool_size: 4096,
            dma_pool_align: 4096,
            identify_chnl_off: 0,
            max_l2p_transfer: None,
        }
    }
}

impl Config {
    pub fn with_max_phys_sect(mut self, sectors: u32) -> Self {
        self.max_phys_sect = sectors;
        self
    }

    pub fn with_dma_pool(mut self, size: usize, align: usize) -> Self {
        self.dma_pool_size = size;
        self.dma_pool_align = align;
        self
    }

    pub fn with_identify_chnl_off(mut self, chnl_off: u32) -> Self {
        self.identify_chnl_off = chnl_off;
        self
    }

    pub fn with_max_l2p_transfer(mut self, bytes: u32) -> Self {
        self.max_l2p_transfer = Some(bytes);
        self
    }

    /// Bytes one L2P request may move, given the transport limit.
    pub fn l2p_transfer_len(&self, transport_max: u32) -> u32 {
        match self.max_l2p_transfer {
            Some(cap) => cap.min(transport_max),
            None => transport_max,
        }
    }
}
